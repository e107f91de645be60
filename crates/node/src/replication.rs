//! Fire-and-forget replication and read-repair tasks.
//!
//! Fan-out never participates in the client's response: tasks are spawned
//! onto the runtime, bounded by the node's background-task semaphore, and
//! their failures only increment the replication-failure counter. Tasks
//! die with the runtime at shutdown.

use crate::state::NodeState;
use ringkv_core::Value;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

/// Replicate a SET to every registered peer.
pub fn spawn_replicate_set(state: Arc<NodeState>, key: String, value: Value) {
    for (peer_id, peer_url) in state.peer_snapshot() {
        let state = Arc::clone(&state);
        let key = key.clone();
        let value = value.clone();
        tokio::spawn(async move {
            let Ok(_permit) = state.background_tasks.clone().acquire_owned().await else {
                return;
            };
            let result = state
                .client
                .post(format!("{peer_url}/set"))
                .json(&json!({ "key": key, "value": value, "is_replica": true }))
                .timeout(state.config.replication_timeout)
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    state.replication_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(peer_id, status = %response.status(), "replica SET rejected");
                }
                Err(err) => {
                    state.replication_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(peer_id, %err, "replica SET failed");
                }
            }
        });
    }
}

/// Replicate a DELETE to every registered peer.
pub fn spawn_replicate_delete(state: Arc<NodeState>, key: String) {
    for (peer_id, peer_url) in state.peer_snapshot() {
        let state = Arc::clone(&state);
        let key = key.clone();
        tokio::spawn(async move {
            let Ok(_permit) = state.background_tasks.clone().acquire_owned().await else {
                return;
            };
            let result = state
                .client
                .delete(format!("{peer_url}/delete/{key}?is_replica=true"))
                .timeout(state.config.replication_timeout)
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    state.replication_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(peer_id, status = %response.status(), "replica DELETE rejected");
                }
                Err(err) => {
                    state.replication_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(peer_id, %err, "replica DELETE failed");
                }
            }
        });
    }
}

/// Check each peer's copy of `key` after a local read and push the local
/// value where a peer disagrees. All failures are silent.
pub fn spawn_read_repair(state: Arc<NodeState>, key: String, expected: Value) {
    tokio::spawn(async move {
        let Ok(_permit) = state.background_tasks.clone().acquire_owned().await else {
            return;
        };
        for (peer_id, peer_url) in state.peer_snapshot() {
            let response = state
                .client
                .get(format!("{peer_url}/get/{key}"))
                .timeout(state.config.read_repair_timeout)
                .send()
                .await;
            let Ok(response) = response else { continue };
            if !response.status().is_success() {
                continue;
            }
            let Ok(body) = response.json::<serde_json::Value>().await else {
                continue;
            };
            let peer_value: Value = match serde_json::from_value(
                body.get("value").cloned().unwrap_or(serde_json::Value::Null),
            ) {
                Ok(value) => value,
                Err(_) => continue,
            };
            if peer_value != expected {
                debug!(peer_id, key = %key, "read repair: pushing local value");
                let _ = state
                    .client
                    .post(format!("{peer_url}/set"))
                    .json(&json!({ "key": key, "value": expected, "is_replica": true }))
                    .timeout(state.config.read_repair_timeout)
                    .send()
                    .await;
            }
        }
    });
}
