use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::StateStore;
use crate::error::StoreError;
use crate::models::{FingerprintKey, ManuscriptStatus, Snapshot};

/// Snapshot kept as a pretty-printed JSON file
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        info!(path = %path.display(), "Using JSON state file");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl StateStore for JsonStateStore {
    fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No snapshot stored yet");
                return Ok(None);
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let snapshot = serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        Ok(Some(snapshot))
    }

    fn save(
        &self,
        status: &ManuscriptStatus,
        fingerprint: &FingerprintKey,
        observed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let snapshot = Snapshot {
            status: status.clone(),
            fingerprint: fingerprint.clone(),
            observed_at,
        };
        let content = serde_json::to_vec_pretty(&snapshot).map_err(StoreError::Encode)?;

        let dir = self.parent_dir();
        fs::create_dir_all(&dir).map_err(|e| self.io_error(e))?;

        // The temp file is removed on drop unless persisted, so every early
        // return below leaves the previous snapshot as it was.
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| self.io_error(e))?;
        tmp.write_all(&content).map_err(|e| self.io_error(e))?;
        tmp.flush().map_err(|e| self.io_error(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_error(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_error(e.error))?;
        sync_dir(&dir).map_err(|e| self.io_error(e))?;

        debug!(
            path = %self.path.display(),
            fingerprint = %fingerprint,
            "Saved snapshot"
        );

        Ok(())
    }
}

/// Flush the directory entry so the rename survives a crash
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
