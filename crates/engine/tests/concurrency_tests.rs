//! Concurrent access through the worker pool.

use ringkv_core::Value;
use ringkv_engine::{PoolConfig, Store, StoreConfig, WorkerPool};
use std::sync::Arc;
use std::thread;

#[test]
fn test_concurrent_writers_distinct_keys() {
    let store = Arc::new(Store::open(StoreConfig::in_memory()).unwrap());
    let pool = Arc::new(WorkerPool::start(store, PoolConfig::default()));

    let mut handles = Vec::new();
    for t in 0..8 {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            for i in 0..50 {
                pool.set(&format!("t{t}:k{i}"), Value::from(i as i64)).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(pool.len().unwrap(), 8 * 50);
    pool.stop().unwrap();
}

/// Independent GET-then-SET increments are not atomic: interleavings lose
/// updates. The final count must be positive but is expected to fall short
/// of the ideal total.
#[test]
fn test_read_modify_write_races_lose_updates() {
    let store = Arc::new(Store::open(StoreConfig::in_memory()).unwrap());
    let pool = Arc::new(WorkerPool::start(store, PoolConfig::default()));
    pool.set("ctr", Value::from(0i64)).unwrap();

    let threads = 50;
    let increments = 100;
    let mut handles = Vec::new();
    for _ in 0..threads {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            for _ in 0..increments {
                let current = match pool.get("ctr").unwrap() {
                    Some(Value::Number(n)) => n,
                    _ => 0.0,
                };
                pool.set("ctr", Value::Number(current + 1.0)).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let final_value = match pool.get("ctr").unwrap() {
        Some(Value::Number(n)) => n,
        other => panic!("counter missing: {other:?}"),
    };
    assert!(final_value > 0.0);
    assert!(final_value <= (threads * increments) as f64);
    pool.stop().unwrap();
}

#[test]
fn test_mixed_readers_and_writers() {
    let store = Arc::new(Store::open(StoreConfig::in_memory()).unwrap());
    let pool = Arc::new(WorkerPool::start(store, PoolConfig::default()));
    pool.set("shared", Value::from("initial")).unwrap();

    let mut handles = Vec::new();
    for t in 0..4 {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            for i in 0..25 {
                pool.set("shared", Value::from(format!("w{t}-{i}"))).unwrap();
                // Reads always observe some complete write.
                assert!(pool.get("shared").unwrap().is_some());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    pool.stop().unwrap();
}
