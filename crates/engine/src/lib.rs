//! Per-node storage engine for ringkv
//!
//! `Store` composes the WAL, the durable snapshot, and the per-key lock
//! table over a concurrent in-memory map, with deterministic crash
//! recovery. `WorkerPool` drives a shared `Store` from a bounded FIFO
//! request queue dispatched to a fixed set of worker threads.

pub mod pool;
pub mod store;

pub use pool::{PoolConfig, PoolStats, WorkerPool};
pub use store::{CheckpointStats, Store, StoreConfig};
