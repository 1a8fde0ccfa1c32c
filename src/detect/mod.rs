mod backend;
pub mod blob;
pub mod motion;
mod result;

pub use backend::{BlobDetector, FrameDiffDetector};
pub use blob::{connected_regions, extract_blobs};
pub use motion::{build_motion_mask, frame_difference, motion_mask, MotionMask};
pub use result::{
    BoundingBox, CandidateBlob, DetectionSettings, Point, DEFAULT_MIN_CONTOUR_HEIGHT,
    DEFAULT_MIN_CONTOUR_WIDTH,
};
