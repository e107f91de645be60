//! In-memory key/value store with WAL-first durability.
//!
//! Write path order per key: append to WAL (flush + fsync), mutate the
//! in-memory map, persist to the durable snapshot, release the key lock.
//! A mutation is acknowledged only after its WAL entry is durable, so a
//! crash at any point replays to the acknowledged state.
//!
//! ## Recovery
//!
//! 1. Hydrate the in-memory map from the snapshot's `load_all`.
//! 2. Replay surviving WAL entries in file order with logging disabled.
//! 3. Clear the snapshot and re-persist every surviving entry, so keys
//!    deleted in the WAL cannot resurrect from the snapshot.
//! 4. Truncate the WAL.
//!
//! Replay is literal: a CLEAR at position i discards state from positions
//! before i but not after it.

use dashmap::DashMap;
use ringkv_concurrency::LockTable;
use ringkv_core::{Result, Value};
use ringkv_durability::{DurableMap, LogEntry, LogOp, SqliteMap, Wal};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// Construction options for [`Store`].
///
/// Both halves of durability are optional: a store with neither path is
/// purely in-memory, one with both gets WAL-first crash recovery.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Path of the write-ahead log file, if logging is enabled.
    pub wal_path: Option<PathBuf>,
    /// Path of the durable snapshot database, if persistence is enabled.
    pub snapshot_path: Option<PathBuf>,
}

impl StoreConfig {
    /// Purely in-memory store: no WAL, no snapshot.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Fully durable store with the conventional side-by-side layout
    /// (`<node>.db` next to `<node>.wal`).
    pub fn durable(snapshot_path: impl Into<PathBuf>, wal_path: impl Into<PathBuf>) -> Self {
        Self {
            wal_path: Some(wal_path.into()),
            snapshot_path: Some(snapshot_path.into()),
        }
    }
}

/// Counters reported by [`Store::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointStats {
    /// Entries currently in the WAL file.
    pub wal_entries: usize,
    /// Keys currently in the durable snapshot.
    pub persisted_keys: usize,
}

/// Concurrent in-memory map with optional WAL and durable snapshot.
pub struct Store {
    data: DashMap<String, Value>,
    locks: LockTable,
    wal: Option<Wal>,
    snapshot: Option<Box<dyn DurableMap>>,
}

impl Store {
    /// Open a store, running crash recovery if durability is configured.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let wal = config.wal_path.map(Wal::open).transpose()?;
        let snapshot = config
            .snapshot_path
            .map(SqliteMap::open)
            .transpose()?
            .map(|map| Box::new(map) as Box<dyn DurableMap>);
        Self::assemble(wal, snapshot)
    }

    /// Open a store over an injected snapshot backing (used by tests and
    /// alternative `DurableMap` implementations).
    pub fn with_parts(wal: Option<Wal>, snapshot: Option<Box<dyn DurableMap>>) -> Result<Self> {
        Self::assemble(wal, snapshot)
    }

    fn assemble(wal: Option<Wal>, snapshot: Option<Box<dyn DurableMap>>) -> Result<Self> {
        let store = Self {
            data: DashMap::new(),
            locks: LockTable::new(),
            wal,
            snapshot,
        };
        store.recover()?;
        Ok(store)
    }

    fn recover(&self) -> Result<()> {
        if let Some(snapshot) = &self.snapshot {
            for (key, value) in snapshot.load_all()? {
                self.data.insert(key, value);
            }
        }
        let Some(wal) = &self.wal else {
            return Ok(());
        };

        let entries = wal.replay()?;
        if !entries.is_empty() {
            wal.disable();
            for entry in &entries {
                self.apply_replayed(entry);
            }
            wal.enable();

            if let Some(snapshot) = &self.snapshot {
                // The replay may have deleted keys the snapshot still holds.
                snapshot.clear()?;
                for item in self.data.iter() {
                    snapshot.put(item.key(), item.value())?;
                }
            }
            info!(entries = entries.len(), keys = self.data.len(), "recovered from WAL");
        }
        wal.truncate()?;
        Ok(())
    }

    fn apply_replayed(&self, entry: &LogEntry) {
        match entry.op {
            LogOp::Set => {
                if let (Some(key), Some(value)) = (&entry.key, &entry.value) {
                    self.data.insert(key.clone(), value.clone());
                }
            }
            LogOp::Delete => {
                if let Some(key) = &entry.key {
                    self.data.remove(key);
                }
            }
            LogOp::Clear => self.data.clear(),
            LogOp::BulkSet => {
                if let Some(Value::Object(members)) = &entry.value {
                    for (key, value) in members {
                        self.data.insert(key.clone(), value.clone());
                    }
                }
            }
        }
    }

    /// Bind `key` to `value`.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.locks.lock(key);
        self.set_locked(key, value)
    }

    /// Inner write path; caller must hold `key`'s lock.
    fn set_locked(&self, key: &str, value: Value) -> Result<()> {
        if let Some(wal) = &self.wal {
            wal.log_set(key, &value)?;
        }
        if let Some(snapshot) = &self.snapshot {
            self.data.insert(key.to_string(), value.clone());
            snapshot.put(key, &value)?;
        } else {
            self.data.insert(key.to_string(), value);
        }
        Ok(())
    }

    /// Read the value bound to `key`, `None` if absent.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.locks.lock(key);
        Ok(self.data.get(key).map(|entry| entry.value().clone()))
    }

    /// Remove `key`. Returns whether the key was present.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let _guard = self.locks.lock(key);
        if !self.data.contains_key(key) {
            return Ok(false);
        }
        if let Some(wal) = &self.wal {
            wal.log_delete(key)?;
        }
        self.data.remove(key);
        if let Some(snapshot) = &self.snapshot {
            snapshot.delete(key)?;
        }
        Ok(true)
    }

    /// Whether `key` is present.
    pub fn exists(&self, key: &str) -> Result<bool> {
        let _guard = self.locks.lock(key);
        Ok(self.data.contains_key(key))
    }

    /// All keys. Consistent only w.r.t. operations that take the global lock.
    pub fn keys(&self) -> Result<Vec<String>> {
        let _guard = self.locks.lock_global();
        Ok(self.data.iter().map(|entry| entry.key().clone()).collect())
    }

    /// All values.
    pub fn values(&self) -> Result<Vec<Value>> {
        let _guard = self.locks.lock_global();
        Ok(self.data.iter().map(|entry| entry.value().clone()).collect())
    }

    /// All key/value pairs.
    pub fn items(&self) -> Result<Vec<(String, Value)>> {
        let _guard = self.locks.lock_global();
        Ok(self
            .data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }

    /// Number of keys.
    pub fn len(&self) -> Result<usize> {
        let _guard = self.locks.lock_global();
        Ok(self.data.len())
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every key.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.locks.lock_global();
        if let Some(wal) = &self.wal {
            wal.log_clear()?;
        }
        self.data.clear();
        if let Some(snapshot) = &self.snapshot {
            snapshot.clear()?;
        }
        Ok(())
    }

    /// Bulk update.
    ///
    /// One compound BULK_SET entry is made durable before any member is
    /// applied; per-entry logging is disabled for the members themselves.
    /// A crash mid-bulk therefore replays the whole batch.
    pub fn update(&self, entries: BTreeMap<String, Value>) -> Result<()> {
        let Some(wal) = &self.wal else {
            for (key, value) in entries {
                self.set(&key, value)?;
            }
            return Ok(());
        };

        wal.log_bulk(&entries)?;
        wal.disable();
        let applied: Result<()> = (|| {
            for (key, value) in entries {
                self.set(&key, value)?;
            }
            Ok(())
        })();
        wal.enable();
        wal.checkpoint()?;
        applied
    }

    /// Flush the WAL and report durability counters. Does not truncate.
    pub fn checkpoint(&self) -> Result<CheckpointStats> {
        let wal_entries = match &self.wal {
            Some(wal) => wal.checkpoint()?,
            None => 0,
        };
        let persisted_keys = match &self.snapshot {
            Some(snapshot) => snapshot.len()?,
            None => 0,
        };
        Ok(CheckpointStats {
            wal_entries,
            persisted_keys,
        })
    }

    /// Clean shutdown: checkpoint, close the WAL, disconnect the snapshot.
    pub fn close(&self) -> Result<()> {
        self.checkpoint()?;
        if let Some(wal) = &self.wal {
            wal.close()?;
        }
        if let Some(snapshot) = &self.snapshot {
            snapshot.disconnect()?;
        }
        Ok(())
    }

    /// Best-effort removal of idle per-key locks.
    pub fn reap_locks(&self) -> usize {
        self.locks.reap_unused()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store() -> Store {
        Store::open(StoreConfig::in_memory()).unwrap()
    }

    #[test]
    fn test_set_get_roundtrip() {
        let store = memory_store();
        store.set("user:1", Value::from("Alice")).unwrap();
        assert_eq!(store.get("user:1").unwrap(), Some(Value::from("Alice")));
        assert_eq!(store.get("user:2").unwrap(), None);
    }

    #[test]
    fn test_set_delete_get_null() {
        let store = memory_store();
        store.set("k", Value::from(1i64)).unwrap();
        assert!(store.delete("k").unwrap());
        assert_eq!(store.get("k").unwrap(), None);
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn test_delete_absent_returns_false() {
        let store = memory_store();
        assert!(!store.delete("missing").unwrap());
    }

    #[test]
    fn test_exists() {
        let store = memory_store();
        assert!(!store.exists("k").unwrap());
        store.set("k", Value::Null).unwrap();
        assert!(store.exists("k").unwrap());
    }

    #[test]
    fn test_whole_store_views() {
        let store = memory_store();
        store.set("a", Value::from(1i64)).unwrap();
        store.set("b", Value::from(2i64)).unwrap();

        let mut keys = store.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(store.values().unwrap().len(), 2);
        assert_eq!(store.items().unwrap().len(), 2);
        assert_eq!(store.len().unwrap(), 2);

        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_update_applies_all_members() {
        let store = memory_store();
        let entries: BTreeMap<String, Value> = (0..10)
            .map(|i| (format!("k{i}"), Value::from(i as i64)))
            .collect();
        store.update(entries).unwrap();
        assert_eq!(store.len().unwrap(), 10);
        assert_eq!(store.get("k7").unwrap(), Some(Value::from(7i64)));
    }

    #[test]
    fn test_overwrite_keeps_latest() {
        let store = memory_store();
        store.set("k", Value::from("old")).unwrap();
        store.set("k", Value::from("new")).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(Value::from("new")));
        assert_eq!(store.len().unwrap(), 1);
    }
}
