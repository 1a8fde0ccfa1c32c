use std::time::Instant;

use vehicle_counter::{
    CancelFlag, CountingPipeline, FileConfig, FileSource, Frame, IterationReport, MemorySource,
    NullSink, OverlayStyle, OverlayWriter, PipelineError, PipelineSettings, Termination,
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 600;

fn black() -> Frame {
    Frame::filled(WIDTH, HEIGHT, [0, 0, 0])
}

/// A 60x60 white block whose box centre lands on the counting line.
fn block_on_line() -> Frame {
    Frame::from_fn(WIDTH, HEIGHT, |x, y| {
        if (100..160).contains(&x) && (520..580).contains(&y) {
            [255, 255, 255]
        } else {
            [0, 0, 0]
        }
    })
}

#[test]
fn block_appearing_on_the_line_is_counted_once() {
    let mut pipeline = CountingPipeline::default();
    let mut source = MemorySource::new("block", vec![black(), block_on_line()]);
    let mut reports: Vec<IterationReport> = Vec::new();
    let mut sink = |report: &IterationReport| -> anyhow::Result<()> {
        reports.push(report.clone());
        Ok(())
    };

    let summary = pipeline
        .run("block", &mut source, &CancelFlag::new(), &mut sink)
        .expect("run");

    assert_eq!(summary.termination, Termination::EndOfStream);
    assert_eq!(summary.frames_read, 2);
    assert_eq!(summary.iterations, 1);
    assert_eq!(summary.vehicle_count, 1);
    assert_eq!(summary.green_time_secs, 32);
    assert_eq!(summary.pending_centroids, 0);

    assert_eq!(reports.len(), 1);
    let blob = reports[0].blobs[0];
    assert_eq!(reports[0].blobs.len(), 1);
    assert_eq!((blob.bbox.x, blob.bbox.y), (99, 519));
    assert_eq!((blob.bbox.width, blob.bbox.height), (64, 64));
    assert_eq!((blob.centroid.x, blob.centroid.y), (131, 551));
    assert_eq!(reports[0].newly_counted, 1);
}

#[test]
fn block_lingering_on_the_line_is_not_counted_twice() {
    // Appearing and then vanishing yield the same difference blob in both iterations.
    let mut pipeline = CountingPipeline::default();
    let mut source = MemorySource::new("linger", vec![black(), block_on_line(), black()]);
    let summary = pipeline
        .run("linger", &mut source, &CancelFlag::new(), &mut NullSink)
        .expect("run");
    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.vehicle_count, 1);
    assert_eq!(summary.pending_centroids, 0);
}

#[test]
fn static_scene_counts_nothing() {
    let mut pipeline = CountingPipeline::default();
    let mut source = MemorySource::new("static", vec![black(), black(), black()]);
    let summary = pipeline
        .run("static", &mut source, &CancelFlag::new(), &mut NullSink)
        .expect("run");
    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.vehicle_count, 0);
    assert_eq!(summary.green_time_secs, 30);
    assert_eq!(summary.alert_phase, "idle");
}

#[test]
fn block_away_from_the_line_stays_pending() {
    let high_block = Frame::from_fn(WIDTH, HEIGHT, |x, y| {
        if (100..160).contains(&x) && (100..160).contains(&y) {
            [200, 200, 200]
        } else {
            [0, 0, 0]
        }
    });
    let mut pipeline = CountingPipeline::default();
    let mut source = MemorySource::new("high", vec![black(), high_block]);
    let summary = pipeline
        .run("high", &mut source, &CancelFlag::new(), &mut NullSink)
        .expect("run");
    assert_eq!(summary.vehicle_count, 0);
    assert_eq!(summary.pending_centroids, 1);
}

#[test]
fn empty_and_single_frame_sources_are_not_processable() {
    for frames in [Vec::new(), vec![black()]] {
        let mut pipeline = CountingPipeline::default();
        let mut source = MemorySource::new("short", frames);
        let summary = pipeline
            .run("short", &mut source, &CancelFlag::new(), &mut NullSink)
            .expect("run");
        assert_eq!(summary.termination, Termination::NoProcessableInput);
        assert_eq!(summary.vehicle_count, 0);
    }
}

#[test]
fn resolution_change_is_fatal() {
    let mut pipeline = CountingPipeline::default();
    let mut source = MemorySource::new(
        "resize",
        vec![black(), black(), Frame::filled(320, 240, [0, 0, 0])],
    );
    let err = pipeline
        .run("resize", &mut source, &CancelFlag::new(), &mut NullSink)
        .expect_err("dimension mismatch");
    match err {
        PipelineError::DimensionMismatch {
            iteration,
            previous,
            current,
        } => {
            assert_eq!(iteration, 1);
            assert_eq!(previous, (WIDTH, HEIGHT));
            assert_eq!(current, (320, 240));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn mid_stream_read_error_keeps_partial_counts() {
    let mut pipeline = CountingPipeline::default();
    let mut source =
        MemorySource::new("flaky", vec![black(), block_on_line()]).failing_with("decoder lost sync");
    let err = pipeline
        .run("flaky", &mut source, &CancelFlag::new(), &mut NullSink)
        .expect_err("source failure");

    assert_eq!(err.code(), "SOURCE_FAILED");
    let partial = err.partial_summary().expect("partial summary");
    assert_eq!(partial.vehicle_count, 1);
    assert_eq!(partial.frames_read, 2);
    assert_eq!(partial.termination, Termination::SourceFailed);
    assert!(err.to_string().contains("decoder lost sync"));
}

#[test]
fn cancelled_before_start_still_finishes_one_iteration() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    let mut pipeline = CountingPipeline::default();
    let mut source = MemorySource::new("cancel", vec![black(), block_on_line(), black()]);
    let summary = pipeline
        .run("cancel", &mut source, &cancel, &mut NullSink)
        .expect("run");
    assert_eq!(summary.termination, Termination::Cancelled);
    assert_eq!(summary.iterations, 1);
    assert_eq!(summary.vehicle_count, 1);
    assert_eq!(source.delivered(), 2);
}

#[test]
fn synthetic_scene_counts_one_pass() {
    let mut pipeline = CountingPipeline::default();
    let mut source = FileSource::open(FileConfig::new("stub://lane")).expect("open stub");
    let mut overlays = OverlayWriter::new(Vec::new(), OverlayStyle::default());
    let summary = pipeline
        .run("stub://lane", &mut source, &CancelFlag::new(), &mut overlays)
        .expect("run");

    assert_eq!(summary.termination, Termination::EndOfStream);
    assert_eq!(summary.frames_read, 32);
    assert_eq!(summary.vehicle_count, 1);
    assert_eq!(summary.green_time_secs, 32);
    assert_eq!(overlays.written(), 31);
}

#[test]
fn lowered_threshold_raises_the_overload_alert() {
    let mut settings = PipelineSettings::default();
    settings.alert.overload_threshold = 0;
    let mut pipeline = CountingPipeline::new(settings);
    let report = pipeline
        .process_pair(&black(), &block_on_line(), Instant::now())
        .expect("iteration");
    assert!(report.alert.active);

    let overlay = report.overlay(&OverlayStyle::default());
    let json = serde_json::to_string(&overlay).expect("serialize");
    assert!(json.contains("Vehicle Overload Alert!"));
}
