//! Error types for the tracking controller.

use crate::permission::PermissionError;
use crate::state_machine::session::Phase;

/// Indicates that tracking could not be started because a session is already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("tracking is already {phase}")]
pub struct SessionAlreadyActive {
    pub phase: Phase,
}

/// Indicates that the controller task has exited and no longer accepts commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("the tracking controller has shut down")]
pub struct ControllerClosed;

/// Reasons a call to [`TrackingController::start`](super::TrackingController::start) can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    AlreadyActive(#[from] SessionAlreadyActive),

    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error("tracking was stopped before the first report completed")]
    Cancelled,

    #[error(transparent)]
    Closed(#[from] ControllerClosed),
}
