//! Cluster partitioning and reconciliation primitives
//!
//! - `ring`: consistent hash ring with virtual nodes; primary and
//!   N-replica lookup
//! - `merkle`: sorted-leaf SHA-256 tree for comparing two nodes' data by
//!   exchanging a single root hash

pub mod merkle;
pub mod ring;

pub use merkle::{MerkleDiff, MerkleTree};
pub use ring::{HashRing, DEFAULT_VIRTUAL_NODES};
