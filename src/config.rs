use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::alert::{AlertSettings, DEFAULT_ALERT_DISPLAY_SECS, DEFAULT_OVERLOAD_THRESHOLD};
use crate::counter::{LineSettings, DEFAULT_CROSSING_OFFSET, DEFAULT_LINE_HEIGHT};
use crate::detect::{DetectionSettings, DEFAULT_MIN_CONTOUR_HEIGHT, DEFAULT_MIN_CONTOUR_WIDTH};
use crate::pipeline::PipelineSettings;
use crate::timing::{SignalTiming, DEFAULT_GREEN_TIME_BASE, DEFAULT_GREEN_TIME_PER_VEHICLE};

const DEFAULT_DB_PATH: &str = "vehicle_counts.db";

pub const CONFIG_ENV: &str = "VEHICLE_COUNTER_CONFIG";

#[derive(Debug, Deserialize, Default)]
struct CounterConfigFile {
    db_path: Option<String>,
    detection: Option<DetectionConfigFile>,
    line: Option<LineConfigFile>,
    alert: Option<AlertConfigFile>,
    timing: Option<TimingConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    min_contour_width: Option<u32>,
    min_contour_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct LineConfigFile {
    line_height: Option<u32>,
    crossing_offset: Option<u32>,
    max_pending_age: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    overload_threshold: Option<u64>,
    display_secs: Option<u64>,
    rearm_after_cooldown: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct TimingConfigFile {
    green_time_base: Option<u64>,
    green_time_per_vehicle: Option<u64>,
    max_green_secs: Option<u64>,
}

/// Runtime configuration for the counter: file values, then environment overrides,
/// then validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterConfig {
    pub db_path: String,
    pub detection: DetectionSettings,
    pub line: LineSettings,
    pub alert: AlertSettings,
    pub timing: SignalTiming,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            detection: DetectionSettings::default(),
            line: LineSettings::default(),
            alert: AlertSettings::default(),
            timing: SignalTiming::default(),
        }
    }
}

impl CounterConfig {
    /// Load from the file named by `VEHICLE_COUNTER_CONFIG` (if set).
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        Self::finish(file_cfg.unwrap_or_default())
    }

    /// Load from an explicit file, ignoring `VEHICLE_COUNTER_CONFIG`.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::finish(read_config_file(path.as_ref())?)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            detection: self.detection.clone(),
            line: self.line.clone(),
            alert: self.alert.clone(),
            timing: self.timing.clone(),
        }
    }

    fn finish(file: CounterConfigFile) -> Result<Self> {
        let mut cfg = Self::from_file(file);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CounterConfigFile) -> Self {
        let detection = file.detection.unwrap_or_default();
        let line = file.line.unwrap_or_default();
        let alert = file.alert.unwrap_or_default();
        let timing = file.timing.unwrap_or_default();

        Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            detection: DetectionSettings {
                min_contour_width: detection
                    .min_contour_width
                    .unwrap_or(DEFAULT_MIN_CONTOUR_WIDTH),
                min_contour_height: detection
                    .min_contour_height
                    .unwrap_or(DEFAULT_MIN_CONTOUR_HEIGHT),
            },
            line: LineSettings {
                line_height: line.line_height.unwrap_or(DEFAULT_LINE_HEIGHT),
                crossing_offset: line.crossing_offset.unwrap_or(DEFAULT_CROSSING_OFFSET),
                max_pending_age: line.max_pending_age,
            },
            alert: AlertSettings {
                overload_threshold: alert
                    .overload_threshold
                    .unwrap_or(DEFAULT_OVERLOAD_THRESHOLD),
                display: Duration::from_secs(
                    alert.display_secs.unwrap_or(DEFAULT_ALERT_DISPLAY_SECS),
                ),
                rearm_after_cooldown: alert.rearm_after_cooldown.unwrap_or(false),
            },
            timing: SignalTiming {
                green_time_base: timing.green_time_base.unwrap_or(DEFAULT_GREEN_TIME_BASE),
                green_time_per_vehicle: timing
                    .green_time_per_vehicle
                    .unwrap_or(DEFAULT_GREEN_TIME_PER_VEHICLE),
                max_green_secs: timing.max_green_secs,
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("VEHICLE_COUNTER_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Some(value) = env_number("VEHICLE_COUNTER_LINE_HEIGHT")? {
            self.line.line_height = value;
        }
        if let Some(value) = env_number("VEHICLE_COUNTER_CROSSING_OFFSET")? {
            self.line.crossing_offset = value;
        }
        if let Some(value) = env_number("VEHICLE_COUNTER_MIN_CONTOUR_WIDTH")? {
            self.detection.min_contour_width = value;
        }
        if let Some(value) = env_number("VEHICLE_COUNTER_MIN_CONTOUR_HEIGHT")? {
            self.detection.min_contour_height = value;
        }
        if let Some(value) = env_number("VEHICLE_COUNTER_OVERLOAD_THRESHOLD")? {
            self.alert.overload_threshold = value;
        }
        if let Some(seconds) = env_number("VEHICLE_COUNTER_ALERT_SECS")? {
            self.alert.display = Duration::from_secs(seconds);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.db_path.trim().is_empty() {
            return Err(anyhow!("db_path must not be empty"));
        }
        if self.line.crossing_offset == 0 {
            return Err(anyhow!("crossing_offset must be greater than zero"));
        }
        if self.detection.min_contour_width == 0 || self.detection.min_contour_height == 0 {
            return Err(anyhow!("minimum contour size must be greater than zero"));
        }
        if self.alert.display.is_zero() {
            return Err(anyhow!("alert display time must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<CounterConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_number<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a non-negative integer", key)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = CounterConfig::from_file(CounterConfigFile::default());
        assert_eq!(cfg, CounterConfig::default());
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.line.line_height, 550);
        assert_eq!(cfg.alert.display, Duration::from_secs(10));
    }

    #[test]
    fn partial_groups_keep_remaining_defaults() {
        let file: CounterConfigFile =
            serde_json::from_str(r#"{ "line": { "line_height": 400 } }"#).unwrap();
        let cfg = CounterConfig::from_file(file);
        assert_eq!(cfg.line.line_height, 400);
        assert_eq!(cfg.line.crossing_offset, 10);
        assert_eq!(cfg.detection.min_contour_width, 40);
    }

    #[test]
    fn rejects_zero_offset() {
        let mut cfg = CounterConfig::default();
        cfg.line.crossing_offset = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_display_time() {
        let mut cfg = CounterConfig::default();
        cfg.alert.display = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn pipeline_settings_mirror_groups() {
        let mut cfg = CounterConfig::default();
        cfg.timing.max_green_secs = Some(90);
        let settings = cfg.pipeline_settings();
        assert_eq!(settings.timing.max_green_secs, Some(90));
        assert_eq!(settings.line, cfg.line);
    }
}
