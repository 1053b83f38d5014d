//! SQLite-backed key-value store
//!
//! One `kv` table holding opaque blobs. A single connection is shared behind
//! a mutex; each operation is one statement, so per-key atomicity comes from
//! SQLite itself.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::info;

use super::errors::{StorageError, StorageResult};
use super::store::KeyValueStore;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
    key   BLOB PRIMARY KEY NOT NULL,
    value BLOB NOT NULL
);";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store file at `path`
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened SQLite store");
        Self::init(conn)
    }

    /// Volatile store, used by tests
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

fn key_str(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}

impl KeyValueStore for SqliteStore {
    fn create(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let conn = self.conn()?;
        match conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        ) {
            Ok(_) => Ok(()),
            Err(e) if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => {
                Err(StorageError::AlreadyExists(key_str(key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, key: &[u8]) -> StorageResult<Vec<u8>> {
        let conn = self.conn()?;
        conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get::<_, Vec<u8>>(0)
        })
        .optional()?
        .ok_or_else(|| StorageError::NotFound(key_str(key)))
    }

    fn update(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE kv SET value = ?2 WHERE key = ?1",
            params![key, value],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(key_str(key)));
        }
        Ok(())
    }

    fn upsert(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        if changed == 0 {
            return Err(StorageError::NotFound(key_str(key)));
        }
        Ok(())
    }

    fn list(&self, prefix: &[u8]) -> StorageResult<Vec<Vec<u8>>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT value FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )?;
        let rows = stmt.query_map(params![prefix], |row| row.get::<_, Vec<u8>>(0))?;
        let mut values = Vec::new();
        for row in rows {
            values.push(row?);
        }
        Ok(values)
    }
}
