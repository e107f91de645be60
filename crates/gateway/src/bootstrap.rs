//! One-shot cluster bootstrap.
//!
//! Registers every node with every other node so they can replicate,
//! read-repair, and serve anti-entropy, then verifies the cluster is
//! reachable. Run once after the node processes are up.

use ringkv_core::NodeId;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

/// Bootstraps peer registration and verifies cluster connectivity.
pub struct ClusterManager {
    nodes: BTreeMap<NodeId, String>,
    client: reqwest::Client,
    register_timeout: Duration,
    verify_timeout: Duration,
}

impl ClusterManager {
    /// Manager over the configured node map.
    pub fn new(nodes: BTreeMap<NodeId, String>) -> Self {
        Self {
            nodes,
            client: reqwest::Client::new(),
            register_timeout: Duration::from_secs(5),
            verify_timeout: Duration::from_secs(3),
        }
    }

    /// Register all nodes with each other. Returns the number of
    /// registrations that failed; failures are logged, not fatal, since
    /// the heartbeat and anti-entropy loops tolerate partial clusters.
    pub async fn register_peers(&self) -> usize {
        let mut failures = 0;
        for (node_id, node_url) in &self.nodes {
            for (peer_id, peer_url) in &self.nodes {
                if peer_id == node_id {
                    continue;
                }
                let result = self
                    .client
                    .post(format!("{node_url}/register_peer"))
                    .query(&[
                        ("peer_id", peer_id.to_string()),
                        ("peer_url", peer_url.clone()),
                    ])
                    .timeout(self.register_timeout)
                    .send()
                    .await;
                match result {
                    Ok(response) if response.status().is_success() => {
                        info!(node_id, peer_id, "registered peer");
                    }
                    Ok(response) => {
                        failures += 1;
                        warn!(node_id, peer_id, status = %response.status(), "peer registration rejected");
                    }
                    Err(err) => {
                        failures += 1;
                        warn!(node_id, peer_id, %err, "peer registration failed");
                    }
                }
            }
        }
        failures
    }

    /// Probe every node's `/health`. True when all respond 2xx.
    pub async fn verify_cluster(&self) -> bool {
        let mut all_healthy = true;
        for (node_id, node_url) in &self.nodes {
            let healthy = match self
                .client
                .get(format!("{node_url}/health"))
                .timeout(self.verify_timeout)
                .send()
                .await
            {
                Ok(response) => response.status().is_success(),
                Err(_) => false,
            };
            if healthy {
                info!(node_id, "node healthy");
            } else {
                all_healthy = false;
                warn!(node_id, "node unreachable or unhealthy");
            }
        }
        all_healthy
    }
}
