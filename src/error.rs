use crate::pipeline::RunSummary;

/// Failures that end a counting run.
///
/// Clean end-of-stream, cancellation and "no processable input" are not errors; they are
/// reported through `Termination` on the returned `RunSummary`.
#[derive(Debug)]
pub enum PipelineError {
    /// The source changed resolution mid-stream. Fatal for the run.
    DimensionMismatch {
        iteration: u64,
        previous: (u32, u32),
        current: (u32, u32),
    },
    /// The source reported a read error after the pipeline started. Carries the counts
    /// accumulated up to the failure so callers can report a partial result.
    SourceFailed {
        summary: Box<RunSummary>,
        source: anyhow::Error,
    },
    /// The iteration sink (renderer, overlay writer) rejected a report.
    Sink(anyhow::Error),
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            PipelineError::SourceFailed { .. } => "SOURCE_FAILED",
            PipelineError::Sink(_) => "SINK_FAILED",
        }
    }

    /// Stamp the iteration a dimension mismatch was detected at.
    pub fn at_iteration(self, at: u64) -> Self {
        match self {
            PipelineError::DimensionMismatch {
                previous, current, ..
            } => PipelineError::DimensionMismatch {
                iteration: at,
                previous,
                current,
            },
            other => other,
        }
    }

    /// Partial summary for mid-stream source failures.
    pub fn partial_summary(&self) -> Option<&RunSummary> {
        match self {
            PipelineError::SourceFailed { summary, .. } => Some(summary),
            _ => None,
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::DimensionMismatch {
                iteration,
                previous,
                current,
            } => write!(
                f,
                "{}: frame size changed at iteration {} ({}x{} -> {}x{})",
                self.code(),
                iteration,
                previous.0,
                previous.1,
                current.0,
                current.1
            ),
            PipelineError::SourceFailed { summary, source } => write!(
                f,
                "{}: frame source failed after {} frames ({} vehicles counted so far): {}",
                self.code(),
                summary.frames_read,
                summary.vehicle_count,
                source
            ),
            PipelineError::Sink(err) => write!(f, "{}: {}", self.code(), err),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::SourceFailed { source, .. } => Some(&**source),
            PipelineError::Sink(err) => Some(&**err),
            PipelineError::DimensionMismatch { .. } => None,
        }
    }
}
