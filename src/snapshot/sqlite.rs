use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{validate_key, SnapshotError, SnapshotStore};

/// How long a statement waits on SQLite's own write lock before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Snapshot slots in a single SQLite table.
///
/// Every key gets its own connection, opened on first use, so a slow
/// statement on one key never holds up another. The database runs in WAL
/// mode; each save is one upsert statement, so a slot is replaced atomically.
pub struct SqliteSnapshotStore {
    path: PathBuf,
    slots: Mutex<HashMap<String, Arc<Mutex<Connection>>>>,
}

impl SqliteSnapshotStore {
    /// Open (or create) the snapshot database at the given path
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let store = SqliteSnapshotStore {
            path: path.into(),
            slots: Mutex::new(HashMap::new()),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, SnapshotError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<(), SnapshotError> {
        let conn = self.connect()?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// The connection dedicated to `key`
    fn slot(&self, key: &str) -> Result<Arc<Mutex<Connection>>, SnapshotError> {
        let mut slots = self.slots.lock().map_err(|_| SnapshotError::Poisoned)?;
        if let Some(conn) = slots.get(key) {
            return Ok(Arc::clone(conn));
        }
        let conn = Arc::new(Mutex::new(self.connect()?));
        slots.insert(key.to_string(), Arc::clone(&conn));
        Ok(conn)
    }

    fn lock(slot: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, SnapshotError> {
        slot.lock().map_err(|_| SnapshotError::Poisoned)
    }

    /// When the slot for `key` was last written
    pub fn saved_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, SnapshotError> {
        validate_key(key)?;
        let slot = self.slot(key)?;
        let conn = Self::lock(&slot)?;
        let saved_at = conn
            .query_row(
                "SELECT saved_at FROM snapshots WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(saved_at)
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), SnapshotError> {
        validate_key(key)?;
        let slot = self.slot(key)?;
        let conn = Self::lock(&slot)?;
        conn.execute(
            "INSERT INTO snapshots (key, payload, saved_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                payload=excluded.payload,
                saved_at=excluded.saved_at",
            params![key, bytes, Utc::now()],
        )?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, SnapshotError> {
        validate_key(key)?;
        let slot = self.slot(key)?;
        let conn = Self::lock(&slot)?;
        let payload = conn
            .query_row(
                "SELECT payload FROM snapshots WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    key       TEXT PRIMARY KEY,
    payload   BLOB NOT NULL,
    saved_at  TEXT NOT NULL
);
"#;
