//! Sources of position fixes.
//!
//! A [`PositionSource`] produces one [`Sample`] on demand. Sources also implement
//! [`CapabilityCheck`] so the [permission gate](crate::permission) can tell "no positioning
//! capability at all" apart from a refusal.

pub mod error;
pub mod gpsd;
pub mod simulated;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use self::error::{PositionError, PositionErrorReason};
pub use self::gpsd::GpsdSource;
pub use self::simulated::SimulatedSource;
use crate::sample::Sample;

/// Produces the current position of the unit.
pub trait PositionSource: Send + Sync + 'static {
    /// Fetch one fix.
    ///
    /// Waits at most `timeout` for the platform. A fix obtained no more than `max_age` ago may
    /// be returned again instead of asking the platform.
    fn fetch_current(
        &self,
        timeout: Duration,
        max_age: Duration,
    ) -> impl Future<Output = Result<Sample, PositionError>> + Send;
}

/// Reports whether the host exposes a positioning capability at all.
pub trait CapabilityCheck: Send + Sync + 'static {
    fn is_available(&self) -> impl Future<Output = bool> + Send;
}

impl<P: PositionSource> PositionSource for Arc<P> {
    fn fetch_current(
        &self,
        timeout: Duration,
        max_age: Duration,
    ) -> impl Future<Output = Result<Sample, PositionError>> + Send {
        (**self).fetch_current(timeout, max_age)
    }
}

impl<P: CapabilityCheck> CapabilityCheck for Arc<P> {
    fn is_available(&self) -> impl Future<Output = bool> + Send {
        (**self).is_available()
    }
}
