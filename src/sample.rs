//! Position samples and the wall-clock timestamps attached to them.

use std::fmt;
use std::time::Duration;

/// Milliseconds since the Unix epoch, as carried in the `ts` field of transmitted envelopes.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct EpochMillis(i64);

impl EpochMillis {
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Time elapsed between `self` and a later `now`.
    ///
    /// Returns `None` when `now` is earlier than `self`, e.g. after the wall clock was stepped
    /// backwards.
    pub fn elapsed_until(self, now: EpochMillis) -> Option<Duration> {
        let delta = now.0.checked_sub(self.0)?;
        u64::try_from(delta).ok().map(Duration::from_millis)
    }
}

impl fmt::Display for EpochMillis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// One position fix. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    latitude: f64,
    longitude: f64,
    speed_mps: f64,
    captured_at: EpochMillis,
}

impl Sample {
    /// Build a sample from a platform fix.
    ///
    /// Unknown, negative or non-finite speeds are reported as `0`.
    pub fn new(
        latitude: f64,
        longitude: f64,
        speed_mps: Option<f64>,
        captured_at: EpochMillis,
    ) -> Self {
        let speed_mps = speed_mps
            .filter(|speed| speed.is_finite() && *speed >= 0.0)
            .unwrap_or(0.0);

        Self {
            latitude,
            longitude,
            speed_mps,
            captured_at,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Ground speed in metres per second, never negative.
    pub fn speed_mps(&self) -> f64 {
        self.speed_mps
    }

    /// Ground speed in kilometres per hour, rounded to the nearest integer.
    pub fn speed_kmh(&self) -> i64 {
        (self.speed_mps * 3.6).round() as i64
    }

    pub fn captured_at(&self) -> EpochMillis {
        self.captured_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_speed_is_zero() {
        let sample = Sample::new(1.0, 2.0, None, EpochMillis::from_millis(10));
        assert_eq!(sample.speed_mps(), 0.0);
    }

    #[test]
    fn test_invalid_speed_is_zero() {
        let at = EpochMillis::from_millis(10);
        assert_eq!(Sample::new(1.0, 2.0, Some(-3.0), at).speed_mps(), 0.0);
        assert_eq!(Sample::new(1.0, 2.0, Some(f64::NAN), at).speed_mps(), 0.0);
        assert_eq!(Sample::new(1.0, 2.0, Some(f64::INFINITY), at).speed_mps(), 0.0);
    }

    #[test]
    fn test_speed_kmh_rounds() {
        let sample = Sample::new(1.0, 2.0, Some(10.0), EpochMillis::from_millis(10));
        assert_eq!(sample.speed_kmh(), 36);

        let sample = Sample::new(1.0, 2.0, Some(0.2), EpochMillis::from_millis(10));
        assert_eq!(sample.speed_kmh(), 1);
    }

    #[test]
    fn test_elapsed_until() {
        let earlier = EpochMillis::from_millis(1_000);
        let later = EpochMillis::from_millis(1_750);

        assert_eq!(earlier.elapsed_until(later), Some(Duration::from_millis(750)));
        assert_eq!(earlier.elapsed_until(earlier), Some(Duration::ZERO));
        assert_eq!(later.elapsed_until(earlier), None);
    }
}
