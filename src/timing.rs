use serde::{Deserialize, Serialize};

pub const DEFAULT_GREEN_TIME_BASE: u64 = 30;
pub const DEFAULT_GREEN_TIME_PER_VEHICLE: u64 = 2;

/// Linear green-time policy: `base + per_vehicle * count`, optionally capped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalTiming {
    pub green_time_base: u64,
    pub green_time_per_vehicle: u64,
    /// Upper bound on the recommendation. `None` leaves it unbounded.
    pub max_green_secs: Option<u64>,
}

impl Default for SignalTiming {
    fn default() -> Self {
        Self {
            green_time_base: DEFAULT_GREEN_TIME_BASE,
            green_time_per_vehicle: DEFAULT_GREEN_TIME_PER_VEHICLE,
            max_green_secs: None,
        }
    }
}

/// Recommended green-light duration in seconds for `vehicle_count` vehicles.
pub fn green_time_seconds(vehicle_count: u64, timing: &SignalTiming) -> u64 {
    let raw = timing
        .green_time_base
        .saturating_add(timing.green_time_per_vehicle.saturating_mul(vehicle_count));
    match timing.max_green_secs {
        Some(cap) => raw.min(cap),
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_values() {
        let timing = SignalTiming::default();
        assert_eq!(green_time_seconds(0, &timing), 30);
        assert_eq!(green_time_seconds(1, &timing), 32);
        assert_eq!(green_time_seconds(5, &timing), 40);
    }

    #[test]
    fn monotonic_in_count() {
        let timing = SignalTiming::default();
        let mut last = 0;
        for count in 0..500 {
            let g = green_time_seconds(count, &timing);
            assert!(g >= last);
            last = g;
        }
    }

    #[test]
    fn unbounded_by_default_and_saturates() {
        let timing = SignalTiming::default();
        assert_eq!(green_time_seconds(10_000, &timing), 20_030);
        assert_eq!(green_time_seconds(u64::MAX, &timing), u64::MAX);
    }

    #[test]
    fn optional_cap_applies() {
        let timing = SignalTiming {
            max_green_secs: Some(90),
            ..SignalTiming::default()
        };
        assert_eq!(green_time_seconds(10, &timing), 50);
        assert_eq!(green_time_seconds(100, &timing), 90);
    }
}
