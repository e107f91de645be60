//! Durability layer for ringkv
//!
//! Two halves, composed by the store above:
//! - `wal`: append-only operation log with fsync-per-entry, replayed after a
//!   crash to restore state
//! - `snapshot`: the `DurableMap` interface over a persistent key/value
//!   snapshot, backed by an embedded SQLite table

pub mod snapshot;
pub mod wal;

pub use snapshot::{DurableMap, SqliteMap};
pub use wal::{LogEntry, LogOp, Wal};
