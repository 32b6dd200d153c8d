//! Video timestamps.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point on the video timeline, in microseconds.
///
/// Totally ordered; all homography, track, and event bookkeeping is keyed
/// by this type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TimeStamp(i64);

impl TimeStamp {
    pub const MIN: TimeStamp = TimeStamp(i64::MIN);
    pub const MAX: TimeStamp = TimeStamp(i64::MAX);

    pub const fn from_micros(us: i64) -> Self {
        Self(us)
    }

    pub const fn from_millis(ms: i64) -> Self {
        Self(ms * 1_000)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * 1e6).round() as i64)
    }

    pub const fn as_micros(&self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 * 1e-6
    }

    /// Absolute distance to another timestamp, in microseconds.
    pub fn abs_diff(&self, other: TimeStamp) -> u64 {
        self.0.abs_diff(other.0)
    }

    /// Returns this timestamp shifted by `us` microseconds (saturating).
    pub fn shifted(&self, us: i64) -> TimeStamp {
        TimeStamp(self.0.saturating_add(us))
    }

    /// True if the two timestamps are within `tolerance_us` of each other.
    pub fn fuzzy_eq(&self, other: TimeStamp, tolerance_us: u64) -> bool {
        self.abs_diff(other) <= tolerance_us
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(TimeStamp::from_millis(3).as_micros(), 3_000);
        assert_eq!(TimeStamp::from_secs_f64(1.5).as_micros(), 1_500_000);
        assert_eq!(TimeStamp::from_micros(10).abs_diff(TimeStamp::from_micros(4)), 6);
    }

    #[test]
    fn test_shift_saturates() {
        assert_eq!(TimeStamp::MAX.shifted(1), TimeStamp::MAX);
        assert_eq!(
            TimeStamp::from_micros(5).shifted(-3_000_000).as_micros(),
            -2_999_995
        );
    }

    #[test]
    fn test_fuzzy_eq() {
        let t = TimeStamp::from_micros(1_000);
        assert!(t.fuzzy_eq(TimeStamp::from_micros(1_010), 10));
        assert!(!t.fuzzy_eq(TimeStamp::from_micros(1_011), 10));
    }
}
