use std::f64::consts::TAU;
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{CapabilityCheck, PositionError, PositionSource};
use crate::sample::{EpochMillis, Sample};
use crate::state_machine::wrappers::input::system::SystemResource;

/// Where simulated units start out.
pub const DEFAULT_ORIGIN: (f64, f64) = (37.7749, -122.4194);

const METRES_PER_DEGREE: f64 = 111_320.0;

/// How far a simulated unit drives between fixes, at its reported speed.
const STEP: Duration = Duration::from_secs(5);

struct Walk {
    rng: StdRng,
    latitude: f64,
    longitude: f64,
}

/// A [`PositionSource`] that wanders randomly around an origin, for running without a receiver.
///
/// Roughly one fix in ten reports its speed as unknown.
pub struct SimulatedSource {
    walk: Mutex<Walk>,
}

impl SimulatedSource {
    pub fn new(origin: (f64, f64)) -> Self {
        Self::with_rng(origin, StdRng::from_os_rng())
    }

    /// A reproducible walk.
    pub fn seeded(origin: (f64, f64), seed: u64) -> Self {
        Self::with_rng(origin, StdRng::seed_from_u64(seed))
    }

    fn with_rng(origin: (f64, f64), rng: StdRng) -> Self {
        Self {
            walk: Mutex::new(Walk {
                rng,
                latitude: origin.0,
                longitude: origin.1,
            }),
        }
    }

    fn step(&self, at: EpochMillis) -> Sample {
        let mut walk = self.walk.lock().expect("simulated walk lock poisoned");

        let speed = if walk.rng.random_bool(0.1) {
            None
        } else {
            Some(walk.rng.random_range(0.0..15.0))
        };
        let bearing = walk.rng.random_range(0.0..TAU);
        let distance = speed.unwrap_or(0.0) * STEP.as_secs_f64();

        walk.latitude += distance * bearing.cos() / METRES_PER_DEGREE;
        walk.longitude +=
            distance * bearing.sin() / (METRES_PER_DEGREE * walk.latitude.to_radians().cos());

        Sample::new(walk.latitude, walk.longitude, speed, at)
    }
}

impl PositionSource for SimulatedSource {
    async fn fetch_current(
        &self,
        _timeout: Duration,
        _max_age: Duration,
    ) -> Result<Sample, PositionError> {
        Ok(self.step(EpochMillis::generate()))
    }
}

impl CapabilityCheck for SimulatedSource {
    async fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_walk_stays_near_origin() {
        let source = SimulatedSource::seeded(DEFAULT_ORIGIN, 7);

        for _ in 0..100 {
            let sample = source
                .fetch_current(Duration::from_secs(10), Duration::from_secs(1))
                .await
                .unwrap();

            assert!((sample.latitude() - DEFAULT_ORIGIN.0).abs() < 0.1);
            assert!((sample.longitude() - DEFAULT_ORIGIN.1).abs() < 0.1);
            assert!(sample.speed_mps() >= 0.0);
        }
    }

    #[test]
    fn test_same_seed_same_walk() {
        let at = EpochMillis::from_millis(0);
        let a = SimulatedSource::seeded(DEFAULT_ORIGIN, 42);
        let b = SimulatedSource::seeded(DEFAULT_ORIGIN, 42);

        for _ in 0..10 {
            assert_eq!(a.step(at), b.step(at));
        }
    }

    #[tokio::test]
    async fn test_always_available() {
        assert!(SimulatedSource::new(DEFAULT_ORIGIN).is_available().await);
    }
}
