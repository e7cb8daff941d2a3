use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::StateStore;
use crate::error::StoreError;
use crate::models::{FingerprintKey, ManuscriptStatus, Snapshot};

/// In-process state store. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStateStore {
    snapshot: Mutex<Option<Snapshot>>,
    saves: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        let guard = self
            .snapshot
            .lock()
            .map_err(|_| StoreError::Unavailable("snapshot lock poisoned".to_string()))?;
        Ok(guard.clone())
    }

    fn save(
        &self,
        status: &ManuscriptStatus,
        fingerprint: &FingerprintKey,
        observed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut guard = self
            .snapshot
            .lock()
            .map_err(|_| StoreError::Unavailable("snapshot lock poisoned".to_string()))?;

        *guard = Some(Snapshot {
            status: status.clone(),
            fingerprint: fingerprint.clone(),
            observed_at,
        });
        self.saves.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}
