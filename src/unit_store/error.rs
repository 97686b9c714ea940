//! Error types for unit id persistence.

use std::io;
use std::path::PathBuf;

/// Indicates that the stored unit id could not be read, written or removed.
#[derive(Debug, thiserror::Error)]
#[error("unit id store at {} is not accessible", path.display())]
pub struct UnitStoreError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}
