//! Node server: the HTTP surface over one store.
//!
//! Each node owns a worker pool + store and a registry of peer nodes.
//! Primary writes are applied locally and fanned out to every peer as
//! fire-and-forget replica writes; reads schedule background read-repair.
//! No peer's response is ever awaited on the client-facing path.

pub mod replication;
pub mod server;
pub mod state;

pub use server::{router, serve};
pub use state::{NodeConfig, NodeState};
