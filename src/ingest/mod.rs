//! Frame ingestion sources.
//!
//! This module provides different sources for decoded frames:
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Directories of still images (PNG/JPEG), one file per frame
//! - Synthetic `stub://` scenes (testing, demos)
//! - In-memory frame lists
//!
//! All sources implement `FrameSource`. `Ok(None)` from `next_frame` is a clean end of
//! stream; `Err` is a read failure and is never folded into end of stream.
//!
//! Ingestion is local-only: URL schemes other than `stub://` are rejected.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod images;
pub mod memory;
mod synthetic;

use anyhow::Result;

use crate::frame::Frame;

pub use file::{FileConfig, FileSource, FileStats, SUPPORTED_VIDEO_EXTENSIONS};
pub use images::ImageSequenceSource;
pub use memory::MemorySource;

/// Sequential frame producer.
pub trait FrameSource {
    /// Next frame, `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release decoder resources. Sources also release them on drop.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Human-readable identifier for logs.
    fn describe(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
