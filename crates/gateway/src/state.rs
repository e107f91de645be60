//! Gateway configuration, membership view, and routing decisions.

use parking_lot::RwLock;
use ringkv_cluster::HashRing;
use ringkv_core::{Error, NodeId, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Gateway tunables. All timeouts are per outbound call.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Configured cluster: node id to base URL. Fixed for the process.
    pub nodes: BTreeMap<NodeId, String>,
    /// Pause between heartbeat sweeps.
    pub heartbeat_interval: Duration,
    /// Timeout for one heartbeat probe.
    pub health_timeout: Duration,
    /// Timeout for forwarding a client request to a node.
    pub forward_timeout: Duration,
    /// Quiet period after startup before the first anti-entropy cycle.
    pub anti_entropy_initial_delay: Duration,
    /// Pause between anti-entropy cycles.
    pub anti_entropy_interval: Duration,
    /// Timeout for fetching a node's full stats snapshot.
    pub stats_timeout: Duration,
    /// Timeout for one reconciliation write.
    pub sync_push_timeout: Duration,
    /// Distinct nodes consulted per key on both read and write paths.
    pub replication_factor: usize,
}

impl GatewayConfig {
    /// Defaults: 5 s heartbeat, 2 s health probes, 5 s forwards, 30 s
    /// anti-entropy warmup then 10 min cycles, replication factor 2.
    pub fn new(nodes: BTreeMap<NodeId, String>) -> Self {
        Self {
            nodes,
            heartbeat_interval: Duration::from_secs(5),
            health_timeout: Duration::from_secs(2),
            forward_timeout: Duration::from_secs(5),
            anti_entropy_initial_delay: Duration::from_secs(30),
            anti_entropy_interval: Duration::from_secs(600),
            stats_timeout: Duration::from_secs(10),
            sync_push_timeout: Duration::from_secs(2),
            replication_factor: 2,
        }
    }
}

/// The set of currently healthy nodes plus a ring over exactly those ids.
///
/// Written only by the health monitor; read by every routing decision.
pub struct Membership {
    /// Healthy node ids.
    pub healthy: BTreeSet<NodeId>,
    /// Ring reflecting only the healthy ids.
    pub ring: HashRing,
}

/// Process-wide gateway state, passed to handlers explicitly.
pub struct GatewayState {
    /// Static configuration.
    pub config: GatewayConfig,
    /// Live membership view.
    pub membership: RwLock<Membership>,
    /// Outbound HTTP client.
    pub client: reqwest::Client,
    /// Gateway start time.
    pub started_at: Instant,
    /// Requests accepted since start.
    pub total_requests: AtomicU64,
    /// Requests that ended in an error response.
    pub failed_requests: AtomicU64,
}

impl GatewayState {
    /// Build gateway state. All configured nodes are assumed healthy until
    /// the first heartbeat sweep says otherwise.
    pub fn new(config: GatewayConfig) -> Arc<Self> {
        let ids: BTreeSet<NodeId> = config.nodes.keys().copied().collect();
        let ring = HashRing::with_default_vnodes(ids.iter().copied());
        Arc::new(Self {
            config,
            membership: RwLock::new(Membership {
                healthy: ids,
                ring,
            }),
            client: reqwest::Client::new(),
            started_at: Instant::now(),
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
        })
    }

    /// First healthy node on `key`'s replication walk. Used by both read
    /// and write paths so failover availability is symmetric.
    pub fn healthy_route(&self, key: &str) -> Result<(NodeId, String)> {
        let membership = self.membership.read();
        if membership.ring.is_empty() {
            return Err(Error::EmptyRing);
        }
        let candidates = membership
            .ring
            .get_nodes_for_replication(key, self.config.replication_factor);
        for node_id in candidates {
            if membership.healthy.contains(&node_id) {
                if let Some(url) = self.config.nodes.get(&node_id) {
                    return Ok((node_id, url.clone()));
                }
            }
        }
        Err(Error::ServiceUnavailable(format!(
            "no healthy replica for key '{key}'"
        )))
    }

    /// Every healthy node on `key`'s replication walk, primary first.
    pub fn healthy_replicas(&self, key: &str) -> Result<Vec<(NodeId, String)>> {
        let membership = self.membership.read();
        if membership.ring.is_empty() {
            return Err(Error::EmptyRing);
        }
        Ok(membership
            .ring
            .get_nodes_for_replication(key, self.config.replication_factor)
            .into_iter()
            .filter(|node_id| membership.healthy.contains(node_id))
            .filter_map(|node_id| {
                self.config
                    .nodes
                    .get(&node_id)
                    .map(|url| (node_id, url.clone()))
            })
            .collect())
    }

    /// Primary owner of `key`, health notwithstanding. EXISTS routes here.
    pub fn primary_route(&self, key: &str) -> Result<(NodeId, String)> {
        let membership = self.membership.read();
        let node_id = membership.ring.get_node(key)?;
        let url = self
            .config
            .nodes
            .get(&node_id)
            .cloned()
            .ok_or_else(|| Error::ServiceUnavailable(format!("node {node_id} not configured")))?;
        Ok((node_id, url))
    }

    /// Healthy nodes with their URLs, ordered by id.
    pub fn healthy_nodes(&self) -> Vec<(NodeId, String)> {
        let membership = self.membership.read();
        self.config
            .nodes
            .iter()
            .filter(|(node_id, _)| membership.healthy.contains(node_id))
            .map(|(node_id, url)| (*node_id, url.clone()))
            .collect()
    }

    /// Number of currently healthy nodes.
    pub fn healthy_count(&self) -> usize {
        self.membership.read().healthy.len()
    }

    /// Healthy majority test: at least floor(N/2) + 1 nodes are up.
    pub fn is_cluster_healthy(&self) -> bool {
        self.healthy_count() >= self.config.nodes.len() / 2 + 1
    }

    /// Record a node as healthy. Returns true if this is a transition
    /// (the node re-entered the view and the ring).
    pub fn mark_healthy(&self, node_id: NodeId) -> bool {
        let mut membership = self.membership.write();
        if membership.healthy.insert(node_id) {
            membership.ring.add_node(node_id);
            true
        } else {
            false
        }
    }

    /// Record a node as unhealthy. Returns true if this is a transition.
    pub fn mark_unhealthy(&self, node_id: NodeId) -> bool {
        let mut membership = self.membership.write();
        if membership.healthy.remove(&node_id) {
            membership.ring.remove_node(node_id);
            true
        } else {
            false
        }
    }

    /// Seconds since the gateway started.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
