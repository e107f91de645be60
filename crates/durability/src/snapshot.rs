//! Durable key/value snapshot.
//!
//! `DurableMap` is the opaque interface the store persists through; the
//! engine never sees the backing. `SqliteMap` is the embedded backing:
//! one `kv_store(key TEXT PRIMARY KEY, value TEXT NOT NULL)` table with
//! JSON-encoded values and insert-or-replace upserts.
//!
//! All operations are synchronous and are called while the relevant key
//! lock (or the global lock) is held by the store.

use parking_lot::Mutex;
use ringkv_core::{Error, Result, Value};
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Persistent crash-safe key -> JSON mapping.
pub trait DurableMap: Send + Sync {
    /// Upsert a key/value pair.
    fn put(&self, key: &str, value: &Value) -> Result<()>;
    /// Read a value, None if absent.
    fn get(&self, key: &str) -> Result<Option<Value>>;
    /// Remove a key. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
    /// Whether a key is present.
    fn exists(&self, key: &str) -> Result<bool>;
    /// Read the full snapshot.
    fn load_all(&self) -> Result<BTreeMap<String, Value>>;
    /// Remove every key.
    fn clear(&self) -> Result<()>;
    /// Number of persisted keys.
    fn len(&self) -> Result<usize>;
    /// Whether the snapshot holds no keys.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
    /// Release the underlying connection. Later calls fail.
    fn disconnect(&self) -> Result<()>;
}

fn sql_err(e: rusqlite::Error) -> Error {
    Error::Snapshot(e.to_string())
}

/// Embedded SQLite backing for [`DurableMap`].
pub struct SqliteMap {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl SqliteMap {
    /// Open (creating if needed) the snapshot database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path).map_err(sql_err)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv_store (
                 key   TEXT PRIMARY KEY,
                 value TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_key ON kv_store(key);",
        )
        .map_err(sql_err)?;
        Ok(Self {
            path,
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard
            .as_ref()
            .ok_or_else(|| Error::Snapshot("snapshot store is disconnected".to_string()))?;
        f(conn).map_err(sql_err)
    }
}

impl DurableMap for SqliteMap {
    fn put(&self, key: &str, value: &Value) -> Result<()> {
        let encoded = value.canonical_json();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv_store (key, value) VALUES (?1, ?2)",
                (key, &encoded),
            )
            .map(|_| ())
        })
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        let row: Option<String> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()
        })?;
        row.map(|text| Value::from_json(&text)).transpose()
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM kv_store WHERE key = ?1", [key])
                .map(|_| ())
        })
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let row: Option<i64> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT 1 FROM kv_store WHERE key = ?1 LIMIT 1",
                [key],
                |row| row.get(0),
            )
            .optional()
        })?;
        Ok(row.is_some())
    }

    fn load_all(&self) -> Result<BTreeMap<String, Value>> {
        let rows: Vec<(String, String)> = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM kv_store")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })?;
        let mut out = BTreeMap::new();
        for (key, text) in rows {
            out.insert(key, Value::from_json(&text)?);
        }
        Ok(out)
    }

    fn clear(&self) -> Result<()> {
        self.with_conn(|conn| conn.execute("DELETE FROM kv_store", []).map(|_| ()))
    }

    fn len(&self) -> Result<usize> {
        let count: i64 =
            self.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM kv_store", [], |row| row.get(0)))?;
        Ok(count as usize)
    }

    fn disconnect(&self) -> Result<()> {
        let mut guard = self.conn.lock();
        *guard = None;
        Ok(())
    }
}
