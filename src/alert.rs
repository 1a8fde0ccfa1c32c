//! Overload alert latch.
//!
//! `Idle --(count > threshold)--> Firing --(display window elapsed)--> Cooldown`.
//!
//! `Cooldown` is terminal for the run unless `rearm_after_cooldown` is set, in which case
//! the end of the display window returns the machine to `Idle`. `reset()` re-arms it
//! unconditionally.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub const DEFAULT_OVERLOAD_THRESHOLD: u64 = 100;
pub const DEFAULT_ALERT_DISPLAY_SECS: u64 = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSettings {
    /// The alert fires once the count is strictly greater than this.
    pub overload_threshold: u64,
    /// How long the alert stays visible.
    #[serde(with = "duration_secs")]
    pub display: Duration,
    pub rearm_after_cooldown: bool,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            overload_threshold: DEFAULT_OVERLOAD_THRESHOLD,
            display: Duration::from_secs(DEFAULT_ALERT_DISPLAY_SECS),
            rearm_after_cooldown: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertPhase {
    Idle,
    Firing { raised_at: Instant },
    Cooldown,
}

impl AlertPhase {
    pub fn label(&self) -> &'static str {
        match self {
            AlertPhase::Idle => "idle",
            AlertPhase::Firing { .. } => "firing",
            AlertPhase::Cooldown => "cooldown",
        }
    }
}

/// Flattened view of the alert for collaborators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlertState {
    pub active: bool,
    pub armed: bool,
    pub raised_at: Option<Instant>,
}

#[derive(Clone, Debug)]
pub struct OverloadAlert {
    settings: AlertSettings,
    phase: AlertPhase,
    fired: u32,
}

impl OverloadAlert {
    pub fn new(settings: AlertSettings) -> Self {
        Self {
            settings,
            phase: AlertPhase::Idle,
            fired: 0,
        }
    }

    /// Advance the machine with the current cumulative count at time `now`.
    pub fn update(&mut self, count: u64, now: Instant) -> AlertPhase {
        if self.phase == AlertPhase::Idle && count > self.settings.overload_threshold {
            self.phase = AlertPhase::Firing { raised_at: now };
            self.fired += 1;
            log::debug!(
                "overload alert raised (count {} > {})",
                count,
                self.settings.overload_threshold
            );
        }

        if let AlertPhase::Firing { raised_at } = self.phase {
            if now.saturating_duration_since(raised_at) >= self.settings.display {
                self.phase = if self.settings.rearm_after_cooldown {
                    AlertPhase::Idle
                } else {
                    AlertPhase::Cooldown
                };
                log::debug!("overload alert cleared -> {}", self.phase.label());
            }
        }

        self.phase
    }

    /// External reset: back to `Idle`, armed.
    pub fn reset(&mut self) {
        self.phase = AlertPhase::Idle;
    }

    pub fn phase(&self) -> AlertPhase {
        self.phase
    }

    pub fn state(&self) -> AlertState {
        match self.phase {
            AlertPhase::Idle => AlertState {
                active: false,
                armed: true,
                raised_at: None,
            },
            AlertPhase::Firing { raised_at } => AlertState {
                active: true,
                armed: false,
                raised_at: Some(raised_at),
            },
            AlertPhase::Cooldown => AlertState {
                active: false,
                armed: false,
                raised_at: None,
            },
        }
    }

    /// Number of times the alert has been raised this run.
    pub fn times_fired(&self) -> u32 {
        self.fired
    }
}

impl Default for OverloadAlert {
    fn default() -> Self {
        Self::new(AlertSettings::default())
    }
}

pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
