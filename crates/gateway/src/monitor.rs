//! Heartbeat-driven membership monitor.
//!
//! One background task wakes every heartbeat interval and probes each
//! configured node's `/health`. On a success for a node outside the view
//! the node re-enters the view and the ring; on failure for a node inside
//! the view it leaves both. The monitor is the only writer of membership,
//! so routing may observe membership at most one heartbeat stale.

use crate::state::GatewayState;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Spawn the health monitor loop.
pub fn spawn_health_monitor(state: Arc<GatewayState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_secs = state.config.heartbeat_interval.as_secs(),
            "health monitor started"
        );
        loop {
            tokio::time::sleep(state.config.heartbeat_interval).await;
            sweep(&state).await;
        }
    })
}

/// Probe every configured node once and apply transitions.
pub async fn sweep(state: &Arc<GatewayState>) {
    for (node_id, url) in state.config.nodes.clone() {
        let alive = match state
            .client
            .get(format!("{url}/health"))
            .timeout(state.config.health_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        };

        if alive {
            if state.mark_healthy(node_id) {
                info!(node_id, "node back online");
            }
        } else if state.mark_unhealthy(node_id) {
            warn!(node_id, "node went offline");
        }
    }
}
