//! Per-key lock table for the ringkv store.
//!
//! Single-key operations take that key's lock; whole-store operations
//! (`keys`, `values`, `items`, `clear`, `size`) take the global lock.
//! Multi-key acquisition deduplicates, sorts by key bytes ascending,
//! acquires in that order, and releases in reverse. Sorted acquisition is
//! the sole discipline that prevents deadlock between concurrent
//! multi-key callers.
//!
//! The table is deliberately not reentrant: callers that already hold a
//! key's lock use the store's `*_locked` inner helpers instead of
//! re-acquiring.

#![warn(missing_docs)]

use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, MutexGuard, RawMutex};
use std::sync::Arc;

type KeyLock = Arc<Mutex<()>>;

/// Guard holding one key's lock. Released on drop.
pub struct KeyGuard {
    _guard: ArcMutexGuard<RawMutex, ()>,
}

/// Guard holding several keys' locks, released in reverse acquisition order.
pub struct MultiGuard {
    guards: Vec<ArcMutexGuard<RawMutex, ()>>,
}

impl Drop for MultiGuard {
    fn drop(&mut self) {
        // Pop from the back so release order is the reverse of acquisition.
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

/// Lazily-created per-key mutexes plus one global store lock.
#[derive(Default)]
pub struct LockTable {
    locks: DashMap<String, KeyLock>,
    global: Mutex<()>,
}

impl LockTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, key: &str) -> KeyLock {
        // DashMap's entry API gives the create-if-absent step the same
        // once-only semantics as double-checked lookup under a meta-lock.
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the lock for one key, blocking until available.
    pub fn lock(&self, key: &str) -> KeyGuard {
        let lock = self.handle(key);
        KeyGuard {
            _guard: lock.lock_arc(),
        }
    }

    /// Acquire locks for a set of keys in deadlock-safe order.
    ///
    /// Keys are deduplicated and sorted ascending by byte value before
    /// acquisition.
    pub fn lock_multi<I, S>(&self, keys: I) -> MultiGuard
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sorted: Vec<String> = keys
            .into_iter()
            .map(|k| k.as_ref().to_string())
            .collect();
        sorted.sort();
        sorted.dedup();

        let guards = sorted
            .iter()
            .map(|key| self.handle(key).lock_arc())
            .collect();
        MultiGuard { guards }
    }

    /// Acquire the global lock used by whole-store operations.
    pub fn lock_global(&self) -> MutexGuard<'_, ()> {
        self.global.lock()
    }

    /// Drop lock entries that are provably unowned.
    ///
    /// Best-effort maintenance only; never required for correctness. A lock
    /// is kept whenever any guard still holds a reference to it.
    pub fn reap_unused(&self) -> usize {
        let before = self.locks.len();
        self.locks
            .retain(|_, lock| Arc::strong_count(lock) > 1 || lock.try_lock().is_none());
        before - self.locks.len()
    }

    /// Number of key locks currently materialized.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no key locks have been materialized.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
