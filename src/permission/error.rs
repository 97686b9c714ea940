//! Error types for permission acquisition.

/// Why the positioning capability could not be used. Terminal for a start attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    /// The host exposes no positioning capability at all.
    #[error("Geolocation is not supported on this host")]
    Unsupported,

    /// The capability exists but the operator refused authorization.
    #[error("Location permission denied")]
    Denied,
}
