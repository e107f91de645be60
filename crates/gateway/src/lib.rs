//! Stateless routing gateway for a ringkv cluster.
//!
//! The gateway holds the configured node map, a membership view of the
//! currently healthy nodes, and a hash ring over those nodes. Requests are
//! routed by consistent hashing with failover across the replication list;
//! a background heartbeat task is the sole writer of the membership view,
//! and a background anti-entropy task reconciles divergent replicas with
//! Merkle tree comparison.

pub mod anti_entropy;
pub mod bootstrap;
pub mod monitor;
pub mod server;
pub mod state;

pub use bootstrap::ClusterManager;
pub use server::{router, serve};
pub use state::{GatewayConfig, GatewayState, Membership};
