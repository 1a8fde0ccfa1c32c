use crate::detect::blob::extract_blobs;
use crate::detect::motion::motion_mask;
use crate::detect::result::{CandidateBlob, DetectionSettings};
use crate::error::PipelineError;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend turns a pair of consecutive frames into the vehicle candidates visible
/// in the current frame. Backends must treat both frames as read-only and must not
/// retain them past the call.
pub trait BlobDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame pair.
    fn detect(
        &mut self,
        previous: &Frame,
        current: &Frame,
    ) -> Result<Vec<CandidateBlob>, PipelineError>;
}

/// Frame-differencing backend: motion mask, connected regions, size filter.
#[derive(Clone, Debug, Default)]
pub struct FrameDiffDetector {
    settings: DetectionSettings,
}

impl FrameDiffDetector {
    pub fn new(settings: DetectionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }
}

impl BlobDetector for FrameDiffDetector {
    fn name(&self) -> &'static str {
        "frame-diff"
    }

    fn detect(
        &mut self,
        previous: &Frame,
        current: &Frame,
    ) -> Result<Vec<CandidateBlob>, PipelineError> {
        let mask = motion_mask(previous, current)?;
        Ok(extract_blobs(&mask, &self.settings))
    }
}
