use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{PermissionError, PermissionGate, PermissionStatus};
use crate::position::CapabilityCheck;

/// The operator's location consent, kept in a small text file.
///
/// The file holds one of `granted`, `denied` or `prompt`. A missing file, or no file configured
/// at all, reads as [`PermissionStatus::Prompt`].
#[derive(Debug, Clone, Default)]
pub struct ConsentFile {
    path: Option<PathBuf>,
}

impl ConsentFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Consent that is never recorded, always reading as [`PermissionStatus::Prompt`].
    pub fn unrecorded() -> Self {
        Self::default()
    }

    /// Read the current consent from disk.
    pub async fn read(&self) -> PermissionStatus {
        let Some(path) = &self.path else {
            return PermissionStatus::Prompt;
        };

        match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents.parse().unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable consent value");
                PermissionStatus::Prompt
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => PermissionStatus::Prompt,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read consent file");
                PermissionStatus::Prompt
            }
        }
    }
}

/// A [`PermissionGate`] combining a capability check with the operator's recorded consent.
#[derive(Debug)]
pub struct ConsentGate<C> {
    capability: Arc<C>,
    consent: ConsentFile,
}

impl<C> ConsentGate<C> {
    pub fn new(capability: Arc<C>, consent: ConsentFile) -> Self {
        Self { capability, consent }
    }
}

impl<C: CapabilityCheck> PermissionGate for ConsentGate<C> {
    async fn acquire(&self) -> Result<PermissionStatus, PermissionError> {
        if !self.capability.is_available().await {
            warn!("Positioning capability is not available");
            return Err(PermissionError::Unsupported);
        }

        let status = self.consent.read().await;
        debug!(status = %status, "Queried location consent");

        match status {
            PermissionStatus::Denied => Err(PermissionError::Denied),
            status => Ok(status),
        }
    }
}
