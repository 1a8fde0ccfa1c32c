//! vehicle_counter - count vehicles crossing a line in road videos

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use vehicle_counter::{
    CancelFlag, CountStore, CounterConfig, CountingPipeline, FileConfig, FileSource,
    IterationReport, IterationSink, OverlayStyle, OverlayWriter, PipelineError, RunSummary,
    SqliteCountStore, Termination,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Video files, image directories or stub:// scenes to process.
    #[arg(required = true, value_name = "VIDEO")]
    videos: Vec<String>,
    /// Configuration file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "VEHICLE_COUNTER_CONFIG")]
    config: Option<PathBuf>,
    /// Override the count database path from the configuration.
    #[arg(long)]
    db: Option<String>,
    /// Write per-iteration overlays as JSON lines. With several videos, each gets its
    /// own file named after its position (overlays.1.jsonl, overlays.2.jsonl, ...).
    #[arg(long, value_name = "PATH")]
    overlay_json: Option<PathBuf>,
    /// Number of videos processed in parallel.
    #[arg(long, default_value_t = 1)]
    jobs: usize,
    /// Stop each video after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Do not store results in the count database.
    #[arg(long)]
    no_persist: bool,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

struct VideoOutcome {
    index: usize,
    video_id: String,
    result: VideoResult,
}

enum VideoResult {
    Finished(Result<RunSummary>),
    /// Never started because cancellation was requested first.
    Skipped,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    if args.jobs == 0 {
        return Err(anyhow!("--jobs must be at least 1"));
    }

    let mut cfg = {
        let _stage = ui.stage("Load configuration");
        match &args.config {
            Some(path) => CounterConfig::load_from(path)?,
            None => CounterConfig::load()?,
        }
    };
    if let Some(db) = &args.db {
        cfg.db_path = db.clone();
    }

    let mut store = if args.no_persist {
        None
    } else {
        let _stage = ui.stage("Open count store");
        Some(SqliteCountStore::open(&cfg.db_path)?)
    };

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            log::warn!("interrupt received; stopping at the next frame pair");
            cancel.cancel();
        })
        .context("error setting Ctrl-C handler")?;
    }

    let mut outcomes = run_all(&args, &cfg, &cancel, &ui);
    outcomes.sort_by_key(|outcome| outcome.index);

    let failed = report_outcomes(
        &outcomes,
        store.as_mut().map(|store| store as &mut dyn CountStore),
        &mut std::io::stdout().lock(),
    )?;
    if failed > 0 {
        return Err(anyhow!("{} of {} videos failed", failed, outcomes.len()));
    }
    Ok(())
}

/// Print one line per video and persist completed runs. Returns how many videos failed.
fn report_outcomes(
    outcomes: &[VideoOutcome],
    mut store: Option<&mut dyn CountStore>,
    out: &mut dyn Write,
) -> Result<usize> {
    let mut failed = 0usize;
    for outcome in outcomes {
        match &outcome.result {
            VideoResult::Finished(Ok(summary)) => {
                writeln!(out, "{}", summary_line(summary))?;
                if summary.termination != Termination::EndOfStream {
                    log::info!(
                        "{}: not persisted ({:?})",
                        summary.video_id,
                        summary.termination
                    );
                    continue;
                }
                if let Some(store) = store.as_mut() {
                    if let Err(err) = store.insert(&summary.record()) {
                        failed += 1;
                        log::error!("{}: failed to persist count: {:#}", summary.video_id, err);
                        writeln!(out, "{}: FAILED to persist: {:#}", outcome.video_id, err)?;
                    }
                }
            }
            VideoResult::Finished(Err(err)) => {
                failed += 1;
                let partial = err
                    .downcast_ref::<PipelineError>()
                    .and_then(PipelineError::partial_summary);
                match partial {
                    Some(summary) => writeln!(
                        out,
                        "{}: FAILED after {} vehicles: {:#}",
                        outcome.video_id, summary.vehicle_count, err
                    )?,
                    None => writeln!(out, "{}: FAILED: {:#}", outcome.video_id, err)?,
                }
            }
            VideoResult::Skipped => writeln!(out, "{}: skipped (cancelled)", outcome.video_id)?,
        }
    }
    Ok(failed)
}

/// Work-share the videos across `--jobs` scoped worker threads.
fn run_all(
    args: &Args,
    cfg: &CounterConfig,
    cancel: &CancelFlag,
    ui: &ui::Ui,
) -> Vec<VideoOutcome> {
    let next = &AtomicUsize::new(0);
    let workers = args.jobs.min(args.videos.len()).max(1);

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(move || {
                    let mut done = Vec::new();
                    loop {
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        let Some(video) = args.videos.get(index) else {
                            break;
                        };
                        if cancel.is_cancelled() {
                            done.push(VideoOutcome {
                                index,
                                video_id: video.clone(),
                                result: VideoResult::Skipped,
                            });
                            continue;
                        }
                        let overlay_path = args
                            .overlay_json
                            .as_deref()
                            .map(|base| overlay_path_for(base, index, args.videos.len()));
                        done.push(VideoOutcome {
                            index,
                            video_id: video.clone(),
                            result: VideoResult::Finished(count_video(
                                video,
                                cfg,
                                args.max_frames,
                                overlay_path.as_deref(),
                                cancel,
                                ui,
                            )),
                        });
                    }
                    done
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(done) => done,
                Err(_) => {
                    log::error!("worker thread panicked");
                    Vec::new()
                }
            })
            .collect()
    })
}

fn count_video(
    video: &str,
    cfg: &CounterConfig,
    max_frames: Option<u64>,
    overlay_path: Option<&Path>,
    cancel: &CancelFlag,
    ui: &ui::Ui,
) -> Result<RunSummary> {
    let mut source = FileSource::open(FileConfig {
        path: video.to_string(),
        max_frames,
    })?;
    let mut overlay = match overlay_path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create overlay file {}", path.display()))?;
            Some(OverlayWriter::new(BufWriter::new(file), OverlayStyle::default()))
        }
        None => None,
    };

    let mut progress = ui.video(video);
    let mut pipeline = CountingPipeline::new(cfg.pipeline_settings());
    let mut sink = |report: &IterationReport| -> Result<()> {
        progress.on_iteration(report)?;
        if let Some(writer) = overlay.as_mut() {
            writer.on_iteration(report)?;
        }
        Ok(())
    };
    let result = pipeline.run(video, &mut source, cancel, &mut sink);
    progress.finish(result.as_ref().ok());

    if let Some(writer) = overlay {
        writer
            .into_inner()
            .flush()
            .context("failed to flush overlay file")?;
    }
    Ok(result?)
}

fn overlay_path_for(base: &Path, index: usize, total: usize) -> PathBuf {
    if total == 1 {
        return base.to_path_buf();
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "overlays".to_string());
    base.with_file_name(format!("{}.{}.jsonl", stem, index + 1))
}

fn summary_line(summary: &RunSummary) -> String {
    let status = match summary.termination {
        Termination::EndOfStream => "done",
        Termination::Cancelled => "cancelled",
        Termination::NoProcessableInput => "no processable input",
        Termination::SourceFailed => "source failed",
    };
    format!(
        "{}: {} vehicles, green time {}s ({}, {} frames, alert {})",
        summary.video_id,
        summary.vehicle_count,
        summary.green_time_secs,
        status,
        summary.frames_read,
        summary.alert_phase
    )
}
