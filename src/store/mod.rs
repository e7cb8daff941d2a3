pub mod json;
pub mod memory;

pub use json::JsonStateStore;
pub use memory::MemoryStateStore;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{FingerprintKey, ManuscriptStatus, Snapshot};

/// Persistence for the last observed snapshot
pub trait StateStore: Send + Sync {
    /// Load the last snapshot. `Ok(None)` means nothing was stored yet.
    fn load(&self) -> Result<Option<Snapshot>, StoreError>;

    /// Replace the stored snapshot. Either the old or the new snapshot is
    /// visible afterwards, never a partial one.
    fn save(
        &self,
        status: &ManuscriptStatus,
        fingerprint: &FingerprintKey,
        observed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}
