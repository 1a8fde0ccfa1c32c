//! Per-video counting pipeline.
//!
//! One `CountingPipeline` owns all per-run state (pending centroids, vehicle count,
//! alert latch), so independent videos can be processed by independent instances on
//! separate threads without sharing anything mutable.
//!
//! Each iteration takes the previous/current frame pair through detection, counting,
//! the overload alert and the green-time policy, hands an `IterationReport` to the sink,
//! and only then checks for cancellation and fetches the next frame.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::alert::{AlertPhase, AlertSettings, AlertState, OverloadAlert};
use crate::counter::{CrossingCounter, LineSettings};
use crate::detect::{BlobDetector, CandidateBlob, DetectionSettings, FrameDiffDetector};
use crate::error::PipelineError;
use crate::frame::{Frame, FramePair};
use crate::ingest::FrameSource;
use crate::render::{build_overlay, Overlay, OverlayInput, OverlayStyle};
use crate::storage::CountRecord;
use crate::timing::{green_time_seconds, SignalTiming};

/// Tunables for one pipeline instance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub detection: DetectionSettings,
    pub line: LineSettings,
    pub alert: AlertSettings,
    pub timing: SignalTiming,
}

// ----------------------------------------------------------------------------
// Cancellation
// ----------------------------------------------------------------------------

/// Cooperative cancellation shared between a controller (e.g. a Ctrl-C handler) and
/// any number of pipelines. Checked once per iteration boundary.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ----------------------------------------------------------------------------
// Outputs
// ----------------------------------------------------------------------------

/// What one iteration produced.
#[derive(Clone, Debug)]
pub struct IterationReport {
    pub iteration: u64,
    pub blobs: Vec<CandidateBlob>,
    pub newly_counted: u64,
    pub vehicle_count: u64,
    pub pending_centroids: usize,
    pub alert: AlertState,
    pub alert_phase: AlertPhase,
    pub green_time_secs: u64,
    pub line_height: u32,
}

impl IterationReport {
    /// Drawing instructions for this iteration.
    pub fn overlay(&self, style: &OverlayStyle) -> Overlay {
        build_overlay(
            &OverlayInput {
                iteration: self.iteration,
                blobs: &self.blobs,
                line_height: self.line_height,
                vehicle_count: self.vehicle_count,
                alert_active: self.alert.active,
                green_time_secs: self.green_time_secs,
            },
            style,
        )
    }
}

/// Why a run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The source ended cleanly.
    EndOfStream,
    /// A cancellation request was observed at an iteration boundary.
    Cancelled,
    /// The source could not deliver the first two frames.
    NoProcessableInput,
    /// The source failed mid-stream; only carried by partial summaries.
    SourceFailed,
}

/// Result of processing one video.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub video_id: String,
    pub frames_read: u64,
    pub iterations: u64,
    pub vehicle_count: u64,
    pub green_time_secs: u64,
    pub pending_centroids: usize,
    pub alerts_raised: u32,
    pub alert_phase: &'static str,
    pub termination: Termination,
}

impl RunSummary {
    /// Persistence record for this run.
    pub fn record(&self) -> CountRecord {
        CountRecord {
            video_id: self.video_id.clone(),
            vehicle_count: self.vehicle_count,
            green_time_secs: self.green_time_secs,
        }
    }
}

// ----------------------------------------------------------------------------
// Sinks
// ----------------------------------------------------------------------------

/// Receives every iteration's outputs (renderers, overlay writers, progress displays).
pub trait IterationSink {
    fn on_iteration(&mut self, report: &IterationReport) -> anyhow::Result<()>;
}

impl<F> IterationSink for F
where
    F: FnMut(&IterationReport) -> anyhow::Result<()>,
{
    fn on_iteration(&mut self, report: &IterationReport) -> anyhow::Result<()> {
        self(report)
    }
}

/// Sink that discards reports.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl IterationSink for NullSink {
    fn on_iteration(&mut self, _report: &IterationReport) -> anyhow::Result<()> {
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Pipeline
// ----------------------------------------------------------------------------

pub struct CountingPipeline {
    settings: PipelineSettings,
    detector: Box<dyn BlobDetector>,
    counter: CrossingCounter,
    alert: OverloadAlert,
    iteration: u64,
}

impl CountingPipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            detector: Box::new(FrameDiffDetector::new(settings.detection.clone())),
            counter: CrossingCounter::new(settings.line.clone()),
            alert: OverloadAlert::new(settings.alert.clone()),
            settings,
            iteration: 0,
        }
    }

    /// Replace the detection backend.
    pub fn with_detector<D: BlobDetector + 'static>(mut self, detector: D) -> Self {
        self.detector = Box::new(detector);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn vehicle_count(&self) -> u64 {
        self.counter.count()
    }

    pub fn green_time_secs(&self) -> u64 {
        green_time_seconds(self.counter.count(), &self.settings.timing)
    }

    pub fn alert_state(&self) -> AlertState {
        self.alert.state()
    }

    pub fn counter(&self) -> &CrossingCounter {
        &self.counter
    }

    /// Externally re-arm the overload alert.
    pub fn reset_alert(&mut self) {
        self.alert.reset();
    }

    /// Run one iteration on a frame pair observed at `now`.
    pub fn process_pair(
        &mut self,
        previous: &Frame,
        current: &Frame,
        now: Instant,
    ) -> Result<IterationReport, PipelineError> {
        let iteration = self.iteration;
        let blobs = self
            .detector
            .detect(previous, current)
            .map_err(|e| e.at_iteration(iteration))?;

        let newly_counted = self.counter.observe(&blobs);
        let vehicle_count = self.counter.count();
        let alert_phase = self.alert.update(vehicle_count, now);
        let green_time_secs = green_time_seconds(vehicle_count, &self.settings.timing);

        if newly_counted > 0 {
            log::debug!(
                "iteration {}: {} vehicle(s) crossed, total {}",
                iteration,
                newly_counted,
                vehicle_count
            );
        }
        log::trace!(
            "iteration {}: {} blobs, {} pending, alert {}",
            iteration,
            blobs.len(),
            self.counter.pending_len(),
            alert_phase.label()
        );

        self.iteration += 1;
        Ok(IterationReport {
            iteration,
            blobs,
            newly_counted,
            vehicle_count,
            pending_centroids: self.counter.pending_len(),
            alert: self.alert.state(),
            alert_phase,
            green_time_secs,
            line_height: self.settings.line.line_height,
        })
    }

    /// Drive the pipeline until the source ends, fails, or `cancel` is set.
    ///
    /// The source is closed before returning, whatever the outcome.
    pub fn run<S: FrameSource + ?Sized>(
        &mut self,
        video_id: &str,
        source: &mut S,
        cancel: &CancelFlag,
        sink: &mut dyn IterationSink,
    ) -> Result<RunSummary, PipelineError> {
        log::info!("counting {} ({})", video_id, source.describe());
        let result = self.drive(video_id, source, cancel, sink);
        if let Err(e) = source.close() {
            log::warn!("failed to close {}: {}", source.describe(), e);
        }
        match &result {
            Ok(summary) => log::info!(
                "{}: {:?} after {} frames, {} vehicles, green time {}s",
                video_id,
                summary.termination,
                summary.frames_read,
                summary.vehicle_count,
                summary.green_time_secs
            ),
            Err(e) => log::error!("{}: {}", video_id, e),
        }
        result
    }

    fn drive<S: FrameSource + ?Sized>(
        &mut self,
        video_id: &str,
        source: &mut S,
        cancel: &CancelFlag,
        sink: &mut dyn IterationSink,
    ) -> Result<RunSummary, PipelineError> {
        let mut frames_read = 0u64;
        let Some(previous) = startup_frame(video_id, source, &mut frames_read) else {
            return Ok(self.summary(video_id, frames_read, Termination::NoProcessableInput));
        };
        let Some(current) = startup_frame(video_id, source, &mut frames_read) else {
            return Ok(self.summary(video_id, frames_read, Termination::NoProcessableInput));
        };
        let mut pair = FramePair::new(previous, current);

        let termination = loop {
            let report = self.process_pair(pair.previous(), pair.current(), Instant::now())?;
            sink.on_iteration(&report).map_err(PipelineError::Sink)?;

            if cancel.is_cancelled() {
                break Termination::Cancelled;
            }

            match source.next_frame() {
                Ok(Some(frame)) => {
                    frames_read += 1;
                    pair.advance(frame);
                }
                Ok(None) => break Termination::EndOfStream,
                Err(source_err) => {
                    return Err(PipelineError::SourceFailed {
                        summary: Box::new(self.summary(
                            video_id,
                            frames_read,
                            Termination::SourceFailed,
                        )),
                        source: source_err,
                    });
                }
            }
        };

        Ok(self.summary(video_id, frames_read, termination))
    }

    fn summary(&self, video_id: &str, frames_read: u64, termination: Termination) -> RunSummary {
        RunSummary {
            video_id: video_id.to_string(),
            frames_read,
            iterations: self.iteration,
            vehicle_count: self.counter.count(),
            green_time_secs: self.green_time_secs(),
            pending_centroids: self.counter.pending_len(),
            alerts_raised: self.alert.times_fired(),
            alert_phase: self.alert.phase().label(),
            termination,
        }
    }
}

/// One of the two frames needed before the first iteration. End of stream and read
/// errors both mean the video has no processable input.
fn startup_frame<S: FrameSource + ?Sized>(
    video_id: &str,
    source: &mut S,
    frames_read: &mut u64,
) -> Option<Frame> {
    match source.next_frame() {
        Ok(Some(frame)) => {
            *frames_read += 1;
            Some(frame)
        }
        Ok(None) => {
            log::warn!(
                "{}: no processable input ({} frame(s) before end of stream)",
                video_id,
                frames_read
            );
            None
        }
        Err(e) => {
            log::warn!("{}: no processable input: {:#}", video_id, e);
            None
        }
    }
}

impl Default for CountingPipeline {
    fn default() -> Self {
        Self::new(PipelineSettings::default())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use crate::ingest::MemorySource;
    use std::time::Duration;

    /// Detector that replays a scripted list of centroids, one entry per iteration.
    struct ScriptedDetector {
        script: Vec<Vec<(u32, u32)>>,
        calls: usize,
    }

    impl BlobDetector for ScriptedDetector {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn detect(
            &mut self,
            _previous: &Frame,
            _current: &Frame,
        ) -> Result<Vec<CandidateBlob>, PipelineError> {
            let step = self.script.get(self.calls).cloned().unwrap_or_default();
            self.calls += 1;
            Ok(step
                .into_iter()
                .map(|(cx, cy)| {
                    CandidateBlob::from_bbox(BoundingBox {
                        x: cx - 20,
                        y: cy - 20,
                        width: 40,
                        height: 40,
                    })
                })
                .collect())
        }
    }

    fn blank(n: usize) -> Vec<Frame> {
        (0..n).map(|_| Frame::filled(8, 8, [0, 0, 0])).collect()
    }

    #[test]
    fn alert_fires_when_scripted_count_passes_threshold() {
        // 101 vehicles cross in the second iteration.
        let crossing: Vec<(u32, u32)> = (0..101).map(|i| (30 + i, 550)).collect();
        let mut pipeline = CountingPipeline::default().with_detector(ScriptedDetector {
            script: vec![vec![], crossing],
            calls: 0,
        });

        let frame = Frame::filled(8, 8, [0, 0, 0]);
        let t0 = Instant::now();
        let r0 = pipeline.process_pair(&frame, &frame, t0).unwrap();
        assert_eq!(r0.alert_phase, AlertPhase::Idle);

        let t1 = t0 + Duration::from_secs(1);
        let r1 = pipeline.process_pair(&frame, &frame, t1).unwrap();
        assert_eq!(r1.vehicle_count, 101);
        assert_eq!(r1.alert_phase, AlertPhase::Firing { raised_at: t1 });
        assert_eq!(r1.green_time_secs, 30 + 2 * 101);

        let r2 = pipeline
            .process_pair(&frame, &frame, t1 + Duration::from_secs(9))
            .unwrap();
        assert!(r2.alert.active);

        let r3 = pipeline
            .process_pair(&frame, &frame, t1 + Duration::from_secs(10))
            .unwrap();
        assert_eq!(r3.alert_phase, AlertPhase::Cooldown);
    }

    #[test]
    fn cancellation_is_checked_after_the_sink() {
        let mut pipeline = CountingPipeline::default();
        let mut source = MemorySource::new("cancel", blank(10));
        let cancel = CancelFlag::new();
        let mut seen = 0u64;
        let summary = {
            let cancel_inner = cancel.clone();
            let mut sink = |report: &IterationReport| -> anyhow::Result<()> {
                seen += 1;
                if report.iteration == 2 {
                    cancel_inner.cancel();
                }
                Ok(())
            };
            pipeline
                .run("cancel", &mut source, &cancel, &mut sink)
                .unwrap()
        };
        assert_eq!(summary.termination, Termination::Cancelled);
        assert_eq!(summary.iterations, 3);
        assert_eq!(seen, 3);
        // Two startup frames plus one per completed advance.
        assert_eq!(summary.frames_read, 4);
    }

    #[test]
    fn single_frame_is_not_processable() {
        let mut pipeline = CountingPipeline::default();
        let mut source = MemorySource::new("one", blank(1));
        let summary = pipeline
            .run("one", &mut source, &CancelFlag::new(), &mut NullSink)
            .unwrap();
        assert_eq!(summary.termination, Termination::NoProcessableInput);
        assert_eq!(summary.iterations, 0);
        assert_eq!(summary.vehicle_count, 0);
    }

    #[test]
    fn startup_read_error_is_not_processable() {
        let mut pipeline = CountingPipeline::default();
        let mut source = MemorySource::new("bad", blank(1)).failing_with("truncated header");
        let summary = pipeline
            .run("bad", &mut source, &CancelFlag::new(), &mut NullSink)
            .unwrap();
        assert_eq!(summary.termination, Termination::NoProcessableInput);
    }

    #[test]
    fn sink_failure_stops_the_run() {
        let mut pipeline = CountingPipeline::default();
        let mut source = MemorySource::new("sink", blank(5));
        let mut sink =
            |_: &IterationReport| -> anyhow::Result<()> { Err(anyhow::anyhow!("renderer gone")) };
        let err = pipeline
            .run("sink", &mut source, &CancelFlag::new(), &mut sink)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Sink(_)));
    }

    #[test]
    fn report_overlay_reflects_state() {
        let mut pipeline = CountingPipeline::default().with_detector(ScriptedDetector {
            script: vec![vec![(100, 550)]],
            calls: 0,
        });
        let frame = Frame::filled(8, 8, [0, 0, 0]);
        let report = pipeline
            .process_pair(&frame, &frame, Instant::now())
            .unwrap();
        let overlay = report.overlay(&OverlayStyle::default());
        let json = serde_json::to_string(&overlay).unwrap();
        assert!(json.contains("Total Vehicle Detected: 1"));
        assert!(json.contains("Green Time: 32s"));
    }
}
