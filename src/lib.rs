//! ringkv: a distributed in-memory key/value store.
//!
//! A fixed-size cluster of peer nodes fronted by a stateless routing
//! gateway. Keys are partitioned by a consistent hash ring with virtual
//! nodes, replicated asynchronously for read availability, made durable
//! per node with a write-ahead log plus snapshot, and reconciled in the
//! background by Merkle tree comparison.
//!
//! This crate re-exports the workspace layers; the `ringkv-node` and
//! `ringkv-gateway` binaries live in `src/bin/`.

pub use ringkv_cluster::{HashRing, MerkleDiff, MerkleTree};
pub use ringkv_core::{Error, NodeId, Result, Value};
pub use ringkv_durability::{DurableMap, LogEntry, LogOp, SqliteMap, Wal};
pub use ringkv_engine::{CheckpointStats, PoolConfig, Store, StoreConfig, WorkerPool};
pub use ringkv_gateway::{ClusterManager, GatewayConfig, GatewayState};
pub use ringkv_node::{NodeConfig, NodeState};
