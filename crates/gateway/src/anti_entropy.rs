//! Merkle-based anti-entropy reconciliation.
//!
//! A background task sleeps through a startup quiet period, then loops:
//! snapshot the healthy subset, and for every unordered pair of healthy
//! nodes fetch both `/stats` data snapshots, build Merkle trees, and push
//! replica writes until the pair agrees. Conflicting keys (present on both
//! sides with different values) are resolved deterministically: the lower
//! node id's value wins. Errors are logged and retried on the next cycle.

use crate::state::GatewayState;
use ringkv_cluster::MerkleTree;
use ringkv_core::{Error, NodeId, Result, Value};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Reconciliation work for one node pair.
#[derive(Debug, Default, PartialEq)]
pub struct SyncPlan {
    /// Keys and values to write to node A as replica writes.
    pub push_to_a: Vec<(String, Value)>,
    /// Keys and values to write to node B as replica writes.
    pub push_to_b: Vec<(String, Value)>,
    /// How many of those pushes resolve value conflicts.
    pub conflicts: usize,
}

impl SyncPlan {
    /// Whether the pair already agrees.
    pub fn is_empty(&self) -> bool {
        self.push_to_a.is_empty() && self.push_to_b.is_empty()
    }
}

/// Aggregate counters for one anti-entropy cycle.
#[derive(Debug, Default)]
pub struct CycleStats {
    /// Node pairs compared without error.
    pub pairs_synced: usize,
    /// Replica writes issued across all pairs.
    pub keys_synced: usize,
    /// Pairs that failed to compare or sync.
    pub errors: usize,
}

/// Deterministic conflict resolution: the lower node id's value wins.
///
/// Snapshots carry no versions, so a true last-writer-wins is not
/// reconstructible here; what matters is that every gateway resolves the
/// same way.
fn resolve_conflict<'v>(
    node_a: NodeId,
    value_a: &'v Value,
    node_b: NodeId,
    value_b: &'v Value,
) -> &'v Value {
    if node_a <= node_b {
        value_a
    } else {
        value_b
    }
}

/// Compute the reconciliation plan for a pair of data snapshots.
///
/// Pure function over the two snapshots; the Merkle root comparison makes
/// the no-divergence case cheap.
pub fn plan_sync(
    node_a: NodeId,
    data_a: &BTreeMap<String, Value>,
    node_b: NodeId,
    data_b: &BTreeMap<String, Value>,
) -> SyncPlan {
    let tree_a = MerkleTree::build(data_a);
    let tree_b = MerkleTree::build(data_b);
    if tree_a.root_hash() == tree_b.root_hash() {
        return SyncPlan::default();
    }

    let diff = tree_a.diff(&tree_b);
    let mut plan = SyncPlan::default();
    for key in &diff.only_in_self {
        plan.push_to_b.push((key.clone(), data_a[key].clone()));
    }
    for key in &diff.only_in_other {
        plan.push_to_a.push((key.clone(), data_b[key].clone()));
    }
    for key in &diff.conflicts {
        let winner = resolve_conflict(node_a, &data_a[key], node_b, &data_b[key]);
        plan.conflicts += 1;
        if winner == &data_a[key] {
            plan.push_to_b.push((key.clone(), winner.clone()));
        } else {
            plan.push_to_a.push((key.clone(), winner.clone()));
        }
    }
    plan
}

/// Spawn the anti-entropy scheduler loop.
pub fn spawn_anti_entropy(state: Arc<GatewayState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_secs = state.config.anti_entropy_interval.as_secs(),
            "anti-entropy scheduler started"
        );
        tokio::time::sleep(state.config.anti_entropy_initial_delay).await;
        loop {
            let stats = run_cycle(&state).await;
            if stats.keys_synced > 0 || stats.errors > 0 {
                info!(
                    pairs = stats.pairs_synced,
                    keys = stats.keys_synced,
                    errors = stats.errors,
                    "anti-entropy cycle finished"
                );
            } else {
                debug!(pairs = stats.pairs_synced, "anti-entropy: all nodes in sync");
            }
            tokio::time::sleep(state.config.anti_entropy_interval).await;
        }
    })
}

/// Run one full reconciliation cycle over the healthy subset.
pub async fn run_cycle(state: &Arc<GatewayState>) -> CycleStats {
    let healthy = state.healthy_nodes();
    let mut stats = CycleStats::default();
    if healthy.len() < 2 {
        debug!(healthy = healthy.len(), "anti-entropy skipped: not enough healthy nodes");
        return stats;
    }

    for i in 0..healthy.len() {
        for j in (i + 1)..healthy.len() {
            let (node_a, url_a) = &healthy[i];
            let (node_b, url_b) = &healthy[j];
            match sync_pair(state, *node_a, url_a, *node_b, url_b).await {
                Ok(synced) => {
                    stats.pairs_synced += 1;
                    stats.keys_synced += synced;
                }
                Err(err) => {
                    stats.errors += 1;
                    warn!(node_a, node_b, %err, "anti-entropy pair failed");
                }
            }
        }
    }
    stats
}

async fn sync_pair(
    state: &Arc<GatewayState>,
    node_a: NodeId,
    url_a: &str,
    node_b: NodeId,
    url_b: &str,
) -> Result<usize> {
    let data_a = fetch_data(state, url_a).await?;
    let data_b = fetch_data(state, url_b).await?;

    let plan = plan_sync(node_a, &data_a, node_b, &data_b);
    if plan.is_empty() {
        return Ok(0);
    }

    let mut synced = 0;
    for (key, value) in &plan.push_to_b {
        if push_replica(state, url_b, key, value).await {
            synced += 1;
        }
    }
    for (key, value) in &plan.push_to_a {
        if push_replica(state, url_a, key, value).await {
            synced += 1;
        }
    }
    debug!(node_a, node_b, synced, conflicts = plan.conflicts, "pair reconciled");
    Ok(synced)
}

/// Fetch one node's full data snapshot from `/stats`.
async fn fetch_data(state: &Arc<GatewayState>, url: &str) -> Result<BTreeMap<String, Value>> {
    let response = state
        .client
        .get(format!("{url}/stats"))
        .timeout(state.config.stats_timeout)
        .send()
        .await
        .map_err(|err| Error::Upstream(err.to_string()))?;
    if !response.status().is_success() {
        return Err(Error::Upstream(format!(
            "stats fetch returned {}",
            response.status()
        )));
    }
    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|err| Error::Upstream(err.to_string()))?;
    let data = body.get("data").cloned().unwrap_or(serde_json::Value::Null);
    serde_json::from_value(data).map_err(|err| Error::Serialization(err.to_string()))
}

/// Issue one reconciliation write; failures are logged and absorbed.
async fn push_replica(state: &Arc<GatewayState>, url: &str, key: &str, value: &Value) -> bool {
    let result = state
        .client
        .post(format!("{url}/set"))
        .json(&json!({ "key": key, "value": value, "is_replica": true }))
        .timeout(state.config.sync_push_timeout)
        .send()
        .await;
    match result {
        Ok(response) if response.status().is_success() => true,
        Ok(response) => {
            warn!(key, status = %response.status(), "reconciliation write rejected");
            false
        }
        Err(err) => {
            warn!(key, %err, "reconciliation write failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(entries: &[(&str, &str)]) -> BTreeMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect()
    }

    fn apply(plan_half: &[(String, Value)], target: &mut BTreeMap<String, Value>) {
        for (key, value) in plan_half {
            target.insert(key.clone(), value.clone());
        }
    }

    #[test]
    fn test_identical_snapshots_plan_nothing() {
        let a = data(&[("k1", "v1"), ("k2", "v2")]);
        let plan = plan_sync(1, &a, 2, &a.clone());
        assert!(plan.is_empty());
        assert_eq!(plan.conflicts, 0);
    }

    #[test]
    fn test_missing_keys_flow_both_ways() {
        let a = data(&[("shared", "s"), ("only_a", "x")]);
        let b = data(&[("shared", "s"), ("only_b", "y")]);
        let plan = plan_sync(1, &a, 2, &b);

        assert_eq!(plan.push_to_b, vec![("only_a".to_string(), Value::from("x"))]);
        assert_eq!(plan.push_to_a, vec![("only_b".to_string(), Value::from("y"))]);
        assert_eq!(plan.conflicts, 0);
    }

    #[test]
    fn test_conflict_lower_node_id_wins() {
        let a = data(&[("k", "from_node_1")]);
        let b = data(&[("k", "from_node_2")]);

        let plan = plan_sync(1, &a, 2, &b);
        assert_eq!(plan.conflicts, 1);
        assert_eq!(plan.push_to_b, vec![("k".to_string(), Value::from("from_node_1"))]);
        assert!(plan.push_to_a.is_empty());

        // Same pair presented in the other order resolves identically.
        let plan = plan_sync(2, &b, 1, &a);
        assert_eq!(plan.push_to_a, vec![("k".to_string(), Value::from("from_node_1"))]);
        assert!(plan.push_to_b.is_empty());
    }

    #[test]
    fn test_applying_plan_converges() {
        let mut a = data(&[("x", "1"), ("conflict", "a_version"), ("a_only", "aa")]);
        let mut b = data(&[("x", "1"), ("conflict", "b_version"), ("b_only", "bb")]);

        let plan = plan_sync(1, &a, 2, &b);
        apply(&plan.push_to_a, &mut a);
        apply(&plan.push_to_b, &mut b);
        assert_eq!(a, b);

        // A second cycle finds nothing to do.
        let plan = plan_sync(1, &a, 2, &b);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_empty_against_populated() {
        let a = data(&[("k1", "v1"), ("k2", "v2")]);
        let b = BTreeMap::new();
        let plan = plan_sync(1, &a, 2, &b);
        assert_eq!(plan.push_to_b.len(), 2);
        assert!(plan.push_to_a.is_empty());
    }
}
