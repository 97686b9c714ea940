//! Error types for position acquisition.

use std::time::Duration;

/// Classification of a [`PositionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionErrorReason {
    Timeout,
    Unavailable,
    AcquisitionFailed,
}

/// A failed attempt to obtain one fix. Transient: the next tick retries independently.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PositionError {
    /// No usable fix arrived within the allowed time.
    #[error("Location error: no fix within {}ms", .after.as_millis())]
    Timeout { after: Duration },

    /// The positioning capability went away, e.g. the daemon stopped or the device was unplugged.
    #[error("Location error: {message}")]
    Unavailable { message: String },

    /// The platform answered but could not produce a position.
    #[error("Location error: {message}")]
    Acquisition { message: String },
}

impl PositionError {
    pub fn reason(&self) -> PositionErrorReason {
        match self {
            PositionError::Timeout { .. } => PositionErrorReason::Timeout,
            PositionError::Unavailable { .. } => PositionErrorReason::Unavailable,
            PositionError::Acquisition { .. } => PositionErrorReason::AcquisitionFailed,
        }
    }

    pub(crate) fn unavailable(message: impl Into<String>) -> Self {
        PositionError::Unavailable {
            message: message.into(),
        }
    }
}
