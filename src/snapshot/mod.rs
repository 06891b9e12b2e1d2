//! Last-known-good payload storage, one slot per resource.
//!
//! Stores are dumb byte slots keyed by resource name. Encoding is JSON and
//! lives in the helpers below, so a corrupt or foreign blob simply reads as
//! "no snapshot". Nothing here ever fails the caller: the snapshot is a cache,
//! not a system of record.

pub mod file;
pub mod sqlite;

pub use file::FileSnapshotStore;
pub use sqlite::SqliteSnapshotStore;

use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid snapshot key: {0}")]
    InvalidKey(String),

    #[error("Snapshot store lock poisoned")]
    Poisoned,
}

/// Byte-slot storage keyed by resource name.
///
/// Implementations must replace a slot atomically: a concurrent reader sees
/// either the previous payload or the new one, never a mix.
pub trait SnapshotStore: Send + Sync {
    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), SnapshotError>;

    /// `Ok(None)` when nothing was ever saved under `key`.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, SnapshotError>;

    /// Human-readable backend name for logging.
    fn name(&self) -> &str;
}

/// Read and decode the snapshot for `key` off the async executor.
///
/// Missing, blank, unreadable, undecodable and slow reads all collapse to
/// `None`.
pub async fn load_json<T>(
    store: Arc<dyn SnapshotStore>,
    key: &'static str,
    read_timeout: Duration,
) -> Option<T>
where
    T: DeserializeOwned + Send + 'static,
{
    let read = tokio::task::spawn_blocking(move || store.load(key));
    let bytes = match tokio::time::timeout(read_timeout, read).await {
        Ok(Ok(Ok(Some(bytes)))) => bytes,
        Ok(Ok(Ok(None))) => return None,
        Ok(Ok(Err(e))) => {
            debug!(cache = key, error = %e, "Failed to read snapshot, treating as empty");
            return None;
        }
        Ok(Err(e)) => {
            debug!(cache = key, error = %e, "Snapshot read task failed");
            return None;
        }
        Err(_) => {
            warn!(cache = key, "Snapshot read timed out after {:?}", read_timeout);
            return None;
        }
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return None;
    }

    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(cache = key, error = %e, "Failed to parse snapshot, treating as empty");
            None
        }
    }
}

/// Serializes the writes of one slot.
///
/// The blocking write holds the lock for its whole duration, so a write whose
/// caller was aborted still finishes before the next one starts.
pub type SlotLock = Arc<Mutex<()>>;

/// Encode and persist `value` under `key`. Failures are logged and dropped.
///
/// `still_current` is checked under `slot` right before the write; when it
/// returns false the write is skipped.
pub async fn save_json<T, F>(
    store: Arc<dyn SnapshotStore>,
    key: &'static str,
    value: &T,
    slot: &SlotLock,
    still_current: F,
) where
    T: Serialize + ?Sized,
    F: Fn() -> bool + Send + 'static,
{
    let bytes = match serde_json::to_vec(value) {
        Ok(b) => b,
        Err(e) => {
            warn!(cache = key, error = %e, "Failed to encode snapshot");
            return;
        }
    };

    let backend = store.name().to_string();
    let slot = Arc::clone(slot);
    let write = tokio::task::spawn_blocking(move || {
        let _slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if !still_current() {
            return Ok(false);
        }
        store.save(key, &bytes).map(|_| true)
    });
    match write.await {
        Ok(Ok(true)) => debug!(cache = key, backend = %backend, "Snapshot saved"),
        Ok(Ok(false)) => debug!(cache = key, "Skipping snapshot write from superseded writer"),
        Ok(Err(e)) => warn!(cache = key, backend = %backend, error = %e, "Failed to save snapshot"),
        Err(e) => warn!(cache = key, error = %e, "Snapshot write task failed"),
    }
}

/// Reject keys that could escape a store's namespace (path separators etc).
pub(crate) fn validate_key(key: &str) -> Result<(), SnapshotError> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(SnapshotError::InvalidKey(key.to_string()))
    }
}
