//! Vehicle Counter
//!
//! Counts vehicles crossing a horizontal line in fixed-camera road video and turns the
//! running count into a traffic-signal green-time recommendation.
//!
//! # Pipeline
//!
//! Each iteration works on a pair of consecutive frames:
//!
//! 1. **Motion mask**: absolute difference, grayscale, 5x5 Gaussian blur, threshold,
//!    dilation and closing (`detect::motion`).
//! 2. **Blobs**: 8-connected foreground regions filtered by minimum size, reduced to
//!    bounding boxes and centroids (`detect::blob`).
//! 3. **Counting**: centroids accumulate in a pending list; points inside the crossing
//!    band are counted once and removed (`counter`).
//! 4. **Alert / timing**: a one-shot overload alert with a display window (`alert`) and
//!    a linear green-time policy (`timing`).
//! 5. **Overlay**: drawing instructions for renderers (`render`).
//!
//! # Module Structure
//!
//! - `frame`: RGB frames and the previous/current pair
//! - `ingest`: frame sources (video files, image directories, synthetic scenes, memory)
//! - `pipeline`: the per-video driver, cancellation and run summaries
//! - `config` / `storage`: layered configuration and SQLite result persistence

pub mod alert;
pub mod config;
pub mod counter;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod render;
pub mod storage;
pub mod timing;

pub use alert::{AlertPhase, AlertSettings, AlertState, OverloadAlert};
pub use config::CounterConfig;
pub use counter::{CrossingCounter, LineSettings};
pub use detect::{
    extract_blobs, motion_mask, BlobDetector, BoundingBox, CandidateBlob, DetectionSettings,
    FrameDiffDetector, MotionMask, Point,
};
pub use error::PipelineError;
pub use frame::{Frame, FramePair};
pub use ingest::{FileConfig, FileSource, FrameSource, ImageSequenceSource, MemorySource};
pub use pipeline::{
    CancelFlag, CountingPipeline, IterationReport, IterationSink, NullSink, PipelineSettings,
    RunSummary, Termination,
};
pub use render::{build_overlay, DrawCommand, Overlay, OverlayStyle, OverlayWriter};
pub use storage::{CountRecord, CountStore, InMemoryCountStore, SqliteCountStore, StoredCount};
pub use timing::{green_time_seconds, SignalTiming};
