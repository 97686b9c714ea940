//! Persistence of the operator-chosen unit id between runs of the agent.

pub mod error;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::unit::UnitId;

pub use self::error::UnitStoreError;

/// Durable storage for a single [`UnitId`].
pub trait UnitStore {
    /// The stored id, or `None` when nothing usable has been stored.
    fn load(&self) -> Result<Option<UnitId>, UnitStoreError>;

    fn save(&self, unit_id: &UnitId) -> Result<(), UnitStoreError>;

    /// Forget the stored id. Succeeds when nothing was stored.
    fn clear(&self) -> Result<(), UnitStoreError>;
}

/// Keeps the unit id as the sole content of a text file.
#[derive(Debug, Clone)]
pub struct FileUnitStore {
    path: PathBuf,
}

impl FileUnitStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, source: std::io::Error) -> UnitStoreError {
        UnitStoreError {
            path: self.path.clone(),
            source,
        }
    }
}

impl UnitStore for FileUnitStore {
    fn load(&self) -> Result<Option<UnitId>, UnitStoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error(e)),
        };

        match UnitId::parse(&contents) {
            Ok(unit_id) => {
                debug!(path = %self.path.display(), vehicle_id = %unit_id, "Loaded stored unit id");
                Ok(Some(unit_id))
            }
            Err(_) => {
                warn!(path = %self.path.display(), "Stored unit id is blank, ignoring");
                Ok(None)
            }
        }
    }

    fn save(&self, unit_id: &UnitId) -> Result<(), UnitStoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.error(e))?;
        }
        fs::write(&self.path, unit_id.as_str()).map_err(|e| self.error(e))
    }

    fn clear(&self) -> Result<(), UnitStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> FileUnitStore {
        FileUnitStore::new(dir.path().join("state").join("vehicle_id"))
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store(&dir).load().unwrap(), None);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let unit_id = UnitId::parse("BUS-42").unwrap();

        store.save(&unit_id).unwrap();

        assert_eq!(store.load().unwrap(), Some(unit_id));
    }

    #[test]
    fn test_load_trims_hand_edited_file() {
        let dir = TempDir::new().unwrap();
        let store = FileUnitStore::new(dir.path().join("vehicle_id"));
        fs::write(store.path(), "  BUS-7 \n").unwrap();

        assert_eq!(store.load().unwrap(), Some(UnitId::parse("BUS-7").unwrap()));
    }

    #[test]
    fn test_blank_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileUnitStore::new(dir.path().join("vehicle_id"));
        fs::write(store.path(), " \n").unwrap();

        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        // Clearing an empty store is fine
        store.clear().unwrap();

        store.save(&UnitId::parse("BUS-42").unwrap()).unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_unreadable_path_is_error() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be
        let store = FileUnitStore::new(dir.path());

        let err = store.load().unwrap_err();
        assert_eq!(err.path, dir.path());
    }
}
