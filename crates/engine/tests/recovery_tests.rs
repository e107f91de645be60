//! Crash-recovery scenarios.
//!
//! Crashes are simulated by dropping the store without `close()` and
//! reopening over the same files: every acknowledged mutation is already
//! fsynced to the WAL, so the reopened store must replay to the
//! acknowledged state.

use ringkv_core::Value;
use ringkv_durability::Wal;
use ringkv_engine::{Store, StoreConfig};
use std::path::Path;
use tempfile::TempDir;

fn durable_config(dir: &Path) -> StoreConfig {
    StoreConfig::durable(dir.join("node.db"), dir.join("node.wal"))
}

#[test]
fn test_acknowledged_writes_survive_crash() {
    let dir = TempDir::new().unwrap();
    {
        let store = Store::open(durable_config(dir.path())).unwrap();
        store.set("a", Value::from(1i64)).unwrap();
        store.set("b", Value::from(2i64)).unwrap();
        store.delete("a").unwrap();
        store.set("c", Value::from(3i64)).unwrap();
        // Hard kill: no close().
    }

    let store = Store::open(durable_config(dir.path())).unwrap();
    assert_eq!(store.get("a").unwrap(), None);
    assert_eq!(store.get("b").unwrap(), Some(Value::from(2i64)));
    assert_eq!(store.get("c").unwrap(), Some(Value::from(3i64)));
    assert_eq!(store.len().unwrap(), 2);

    // Recovery truncates the log.
    assert!(!dir.path().join("node.wal").exists());
}

#[test]
fn test_delete_durability() {
    let dir = TempDir::new().unwrap();
    {
        let store = Store::open(durable_config(dir.path())).unwrap();
        store.set("k", Value::from("v")).unwrap();
        store.delete("k").unwrap();
    }
    let store = Store::open(durable_config(dir.path())).unwrap();
    assert!(!store.exists("k").unwrap());
}

#[test]
fn test_clear_durability() {
    let dir = TempDir::new().unwrap();
    {
        let store = Store::open(durable_config(dir.path())).unwrap();
        for i in 0..5 {
            store.set(&format!("k{i}"), Value::from(i as i64)).unwrap();
        }
        store.clear().unwrap();
    }
    let store = Store::open(durable_config(dir.path())).unwrap();
    assert_eq!(store.len().unwrap(), 0);
}

#[test]
fn test_replay_applies_clear_in_order() {
    let dir = TempDir::new().unwrap();
    {
        let store = Store::open(durable_config(dir.path())).unwrap();
        store.set("before", Value::from(1i64)).unwrap();
        store.clear().unwrap();
        store.set("after", Value::from(2i64)).unwrap();
    }
    let store = Store::open(durable_config(dir.path())).unwrap();
    assert_eq!(store.get("before").unwrap(), None);
    assert_eq!(store.get("after").unwrap(), Some(Value::from(2i64)));
}

#[test]
fn test_wal_delete_overrides_stale_snapshot() {
    let dir = TempDir::new().unwrap();
    let config = durable_config(dir.path());
    {
        let store = Store::open(config.clone()).unwrap();
        store.set("ghost", Value::from("boo")).unwrap();
        store.close().unwrap();
    }

    // A DELETE that reached the WAL but not the snapshot (crash between
    // the two steps of the write path).
    let wal = Wal::open(dir.path().join("node.wal")).unwrap();
    wal.log_delete("ghost").unwrap();
    wal.close().unwrap();

    let store = Store::open(config).unwrap();
    assert!(!store.exists("ghost").unwrap(), "deleted key resurrected from snapshot");
    assert_eq!(store.len().unwrap(), 0);

    // And the reconciled snapshot must agree after another restart.
    drop(store);
    let store = Store::open(durable_config(dir.path())).unwrap();
    assert!(!store.exists("ghost").unwrap());
}

#[test]
fn test_bulk_update_survives_crash() {
    let dir = TempDir::new().unwrap();
    {
        let store = Store::open(durable_config(dir.path())).unwrap();
        let entries = (0..20)
            .map(|i| (format!("bulk{i}"), Value::from(i as i64)))
            .collect();
        store.update(entries).unwrap();
    }
    let store = Store::open(durable_config(dir.path())).unwrap();
    assert_eq!(store.len().unwrap(), 20);
    assert_eq!(store.get("bulk13").unwrap(), Some(Value::from(13i64)));
}

#[test]
fn test_snapshot_only_store_hydrates() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        wal_path: None,
        snapshot_path: Some(dir.path().join("node.db")),
    };
    {
        let store = Store::open(config.clone()).unwrap();
        store.set("k", Value::from("v")).unwrap();
        store.close().unwrap();
    }
    let store = Store::open(config).unwrap();
    assert_eq!(store.get("k").unwrap(), Some(Value::from("v")));
}

#[test]
fn test_clean_shutdown_leaves_consistent_state() {
    let dir = TempDir::new().unwrap();
    {
        let store = Store::open(durable_config(dir.path())).unwrap();
        store.set("k", Value::from("v")).unwrap();
        store.close().unwrap();
    }
    let store = Store::open(durable_config(dir.path())).unwrap();
    assert_eq!(store.get("k").unwrap(), Some(Value::from("v")));
    assert_eq!(store.len().unwrap(), 1);
}

#[test]
fn test_checkpoint_reports_counts() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(durable_config(dir.path())).unwrap();
    store.set("a", Value::from(1i64)).unwrap();
    store.set("b", Value::from(2i64)).unwrap();

    let stats = store.checkpoint().unwrap();
    assert_eq!(stats.wal_entries, 2);
    assert_eq!(stats.persisted_keys, 2);

    // Checkpoint does not truncate.
    let stats = store.checkpoint().unwrap();
    assert_eq!(stats.wal_entries, 2);
}
