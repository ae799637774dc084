//! Storage module for Kioku
//!
//! Key/value persistence for the mastery collection. The tracker only sees
//! the [`Persistence`] trait; the CLI backs it with SQLite.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors raised by a persistence backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Opaque load/save of byte blobs under a string key
pub trait Persistence: Send {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
}

/// Schema for the key/value table
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY NOT NULL,
    value BLOB NOT NULL,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Persistence backed by a single SQLite table
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;

        // WAL mode so readers (status, stats) don't block the writer
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self { conn })
    }

    /// In-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Last write time of a key, as stored by SQLite
    pub fn updated_at(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.conn
            .query_row("SELECT updated_at FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .map_err(Into::into)
    }
}

impl Persistence for SqliteStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut stmt = self.conn.prepare_cached("SELECT value FROM kv WHERE key = ?1")?;
        stmt.query_row(params![key], |row| row.get(0))
            .optional()
            .map_err(Into::into)
    }

    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![key, bytes],
        )?;
        debug!("Saved {} bytes under {}", bytes.len(), key);
        Ok(())
    }
}

/// Shared in-memory persistence
///
/// Clones share the same map, so a test can keep a handle and inspect what
/// the tracker's writer saved.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with one value
    pub fn with_value(key: &str, bytes: impl Into<Vec<u8>>) -> Self {
        let store = Self::new();
        store.inner.lock().insert(key.to_string(), bytes.into());
        store
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().get(key).cloned()
    }
}

impl Persistence for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.get(key))
    }

    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.inner.lock().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sqlite_save_and_load() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert!(store.load("missing").unwrap().is_none());

        store.save("k", b"first").unwrap();
        store.save("k", b"second").unwrap();
        assert_eq!(store.load("k").unwrap().unwrap(), b"second");
        assert!(store.updated_at("k").unwrap().is_some());
        assert!(store.updated_at("missing").unwrap().is_none());
    }

    #[test]
    fn test_sqlite_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("kioku.sqlite");

        {
            let mut store = SqliteStore::open(&db_path).unwrap();
            store.save("mastery", br#"{"english":{}}"#).unwrap();
        }

        let store = SqliteStore::open(&db_path).unwrap();
        assert_eq!(store.load("mastery").unwrap().unwrap(), br#"{"english":{}}"#);
    }

    #[test]
    fn test_memory_store_clones_share_state() {
        let store = MemoryStore::new();
        let mut writer = store.clone();
        writer.save("k", b"v").unwrap();
        assert_eq!(store.get("k").unwrap(), b"v");
        assert_eq!(store.load("k").unwrap().unwrap(), b"v");
    }
}
