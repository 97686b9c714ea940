//! Authorization to use the position source.

pub mod consent;
pub mod error;

use std::fmt;
use std::future::Future;
use std::str::FromStr;

pub use self::consent::{ConsentFile, ConsentGate};
pub use self::error::PermissionError;

/// The last known authorization state of the positioning capability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PermissionStatus {
    /// No decision recorded yet; the platform may still ask when a fix is requested.
    #[default]
    Prompt,
    Granted,
    Denied,
}

impl fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PermissionStatus::Prompt => "prompt",
            PermissionStatus::Granted => "granted",
            PermissionStatus::Denied => "denied",
        };
        f.write_str(name)
    }
}

/// Indicates that a permission value was not one of `prompt`, `granted` or `denied`.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown permission status '{0}'")]
pub struct UnknownPermissionStatus(pub String);

impl FromStr for PermissionStatus {
    type Err = UnknownPermissionStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prompt" => Ok(PermissionStatus::Prompt),
            "granted" => Ok(PermissionStatus::Granted),
            "denied" => Ok(PermissionStatus::Denied),
            _ => Err(UnknownPermissionStatus(s.to_string())),
        }
    }
}

/// Negotiates authorization to use the position source.
///
/// Every call performs a fresh query; a previous refusal never prevents a later call from
/// succeeding once the operator re-authorizes out of band.
pub trait PermissionGate: Send + Sync + 'static {
    /// Query the current authorization.
    ///
    /// On success the returned status is either [`PermissionStatus::Granted`] or
    /// [`PermissionStatus::Prompt`]; a refusal is always reported as an error.
    fn acquire(&self) -> impl Future<Output = Result<PermissionStatus, PermissionError>> + Send;
}
