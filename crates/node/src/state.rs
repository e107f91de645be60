//! Per-node runtime state and configuration.

use dashmap::DashMap;
use ringkv_core::NodeId;
use ringkv_engine::WorkerPool;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Tunables for one node server.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// This node's cluster-wide identifier.
    pub node_id: NodeId,
    /// Per-peer timeout for replication writes.
    pub replication_timeout: Duration,
    /// Per-peer timeout for read-repair probes and fixes.
    pub read_repair_timeout: Duration,
    /// Cap on concurrently in-flight background replication tasks.
    pub max_background_tasks: usize,
}

impl NodeConfig {
    /// Defaults for `node_id`: 2 s replication timeout, 1 s read-repair
    /// timeout, 64 in-flight background tasks.
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            replication_timeout: Duration::from_secs(2),
            read_repair_timeout: Duration::from_secs(1),
            max_background_tasks: 64,
        }
    }
}

/// Shared state behind every node handler.
///
/// Handlers receive this as an explicit axum state; there are no ambient
/// singletons. Counters are plain atomics read by `/health` and `/stats`.
pub struct NodeState {
    /// Node configuration.
    pub config: NodeConfig,
    /// Worker pool driving the local store.
    pub pool: Arc<WorkerPool>,
    /// Peer registry: node id to base URL. Mutable via `/register_peer`.
    pub peers: DashMap<NodeId, String>,
    /// Outbound HTTP client shared by replication and read-repair.
    pub client: reqwest::Client,
    /// Bounds the background replication/read-repair task group.
    pub background_tasks: Arc<Semaphore>,
    /// Server start time for uptime reporting.
    pub started_at: Instant,
    /// Reads served since start.
    pub total_reads: AtomicU64,
    /// Writes (SET + DELETE) served since start.
    pub total_writes: AtomicU64,
    /// Replication attempts that failed or were rejected.
    pub replication_failures: AtomicU64,
}

impl NodeState {
    /// Assemble node state over a running worker pool.
    pub fn new(config: NodeConfig, pool: Arc<WorkerPool>) -> Arc<Self> {
        let background_tasks = Arc::new(Semaphore::new(config.max_background_tasks));
        Arc::new(Self {
            config,
            pool,
            peers: DashMap::new(),
            client: reqwest::Client::new(),
            background_tasks,
            started_at: Instant::now(),
            total_reads: AtomicU64::new(0),
            total_writes: AtomicU64::new(0),
            replication_failures: AtomicU64::new(0),
        })
    }

    /// This node's id.
    pub fn node_id(&self) -> NodeId {
        self.config.node_id
    }

    /// Seconds since the server started.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Stable snapshot of the peer registry.
    pub fn peer_snapshot(&self) -> Vec<(NodeId, String)> {
        self.peers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }
}
