use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use vehicle_counter::pipeline::{IterationReport, IterationSink, RunSummary};

/// Iterations between progress refreshes in plain mode.
const PLAIN_REPORT_EVERY: u64 = 500;

#[derive(Clone, Copy, Debug)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
    bars: MultiProgress,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        let bars = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
        Self {
            mode,
            is_tty,
            disable_pretty,
            bars,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    fn spinner(&self, message: String) -> ProgressBar {
        let spinner = self.bars.add(ProgressBar::new_spinner());
        spinner.enable_steady_tick(Duration::from_millis(120));
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(message);
        spinner
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = self.spinner(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Progress display for one video; doubles as an iteration sink.
    pub fn video(&self, video_id: &str) -> VideoProgress {
        let spinner = if self.use_pretty() {
            Some(self.spinner(format!("{video_id}: starting")))
        } else {
            eprintln!("==> {}", video_id);
            None
        };
        VideoProgress {
            video_id: video_id.to_string(),
            start: Instant::now(),
            spinner,
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

pub struct VideoProgress {
    video_id: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl VideoProgress {
    pub fn finish(&self, summary: Option<&RunSummary>) {
        let elapsed = format_duration(self.start.elapsed());
        let message = match summary {
            Some(summary) => format!(
                "✔ {}: {} vehicles, green {}s ({})",
                self.video_id, summary.vehicle_count, summary.green_time_secs, elapsed
            ),
            None => format!("✘ {} ({})", self.video_id, elapsed),
        };
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

impl IterationSink for VideoProgress {
    fn on_iteration(&mut self, report: &IterationReport) -> anyhow::Result<()> {
        let message = format!(
            "{}: frame pair {} | {} vehicles | green {}s{}",
            self.video_id,
            report.iteration,
            report.vehicle_count,
            report.green_time_secs,
            if report.alert.active { " | OVERLOAD" } else { "" }
        );
        match &self.spinner {
            Some(spinner) => spinner.set_message(message),
            None if report.iteration % PLAIN_REPORT_EVERY == 0 => eprintln!("    {message}"),
            None => {}
        }
        Ok(())
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
