//! Consistent hash ring with virtual nodes.
//!
//! Each physical node contributes `DEFAULT_VIRTUAL_NODES` positions whose
//! hashes are `MD5("<node_id>:<virtual_index>")` read as an unsigned
//! 128-bit integer. A key maps to the first position clockwise from
//! `MD5(key)`, wrapping past the top of the ring. Virtual nodes smooth the
//! load: adding or removing one node remaps only ~1/N of keys.
//!
//! MD5 is chosen for distribution quality, not security.

use md5::{Digest, Md5};
use ringkv_core::{Error, NodeId, Result};
use std::collections::BTreeMap;

/// Virtual positions per physical node.
pub const DEFAULT_VIRTUAL_NODES: u32 = 150;

/// One virtual position on the ring.
///
/// Ordering is total over `(hash, node_id, virtual_index)` so hash
/// collisions between virtual points cannot make the ring order ambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct RingPoint {
    hash: u128,
    node_id: NodeId,
    virtual_index: u32,
}

fn hash_bytes(input: &[u8]) -> u128 {
    u128::from_be_bytes(Md5::digest(input).into())
}

/// Consistent hash ring mapping keys to physical node ids.
#[derive(Debug, Clone)]
pub struct HashRing {
    points: Vec<RingPoint>,
    virtual_nodes: u32,
}

impl HashRing {
    /// Build a ring over `nodes` with `virtual_nodes` positions per node.
    pub fn new(nodes: impl IntoIterator<Item = NodeId>, virtual_nodes: u32) -> Self {
        let mut ring = Self {
            points: Vec::new(),
            virtual_nodes,
        };
        for node_id in nodes {
            ring.add_node(node_id);
        }
        ring
    }

    /// Build a ring with the default virtual node count.
    pub fn with_default_vnodes(nodes: impl IntoIterator<Item = NodeId>) -> Self {
        Self::new(nodes, DEFAULT_VIRTUAL_NODES)
    }

    /// Insert all virtual positions for `node_id`.
    ///
    /// Idempotent: re-adding a present node changes nothing.
    pub fn add_node(&mut self, node_id: NodeId) {
        if self.contains(node_id) {
            return;
        }
        for virtual_index in 0..self.virtual_nodes {
            let hash = hash_bytes(format!("{node_id}:{virtual_index}").as_bytes());
            self.points.push(RingPoint {
                hash,
                node_id,
                virtual_index,
            });
        }
        self.points.sort_unstable();
    }

    /// Remove all virtual positions owned by `node_id`.
    pub fn remove_node(&mut self, node_id: NodeId) {
        self.points.retain(|point| point.node_id != node_id);
    }

    /// Whether `node_id` owns any position on the ring.
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.points.iter().any(|point| point.node_id == node_id)
    }

    /// Whether the ring has no positions.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of distinct physical nodes on the ring.
    pub fn node_count(&self) -> usize {
        let mut ids: Vec<NodeId> = self.points.iter().map(|point| point.node_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    fn start_index(&self, key: &str) -> usize {
        let target = hash_bytes(key.as_bytes());
        let idx = self.points.partition_point(|point| point.hash < target);
        // Past the last position: wrap to the start of the ring.
        if idx == self.points.len() {
            0
        } else {
            idx
        }
    }

    /// Primary node for `key`: first position clockwise from the key hash.
    pub fn get_node(&self, key: &str) -> Result<NodeId> {
        if self.points.is_empty() {
            return Err(Error::EmptyRing);
        }
        Ok(self.points[self.start_index(key)].node_id)
    }

    /// Primary plus replicas: walk clockwise collecting distinct physical
    /// node ids until `n` are gathered or the ring is exhausted.
    ///
    /// The returned list has length `min(n, distinct_nodes)` and starts
    /// with the primary.
    pub fn get_nodes_for_replication(&self, key: &str, n: usize) -> Vec<NodeId> {
        if self.points.is_empty() || n == 0 {
            return Vec::new();
        }
        let start = self.start_index(key);
        let mut nodes = Vec::with_capacity(n);
        for offset in 0..self.points.len() {
            let node_id = self.points[(start + offset) % self.points.len()].node_id;
            if !nodes.contains(&node_id) {
                nodes.push(node_id);
                if nodes.len() == n {
                    break;
                }
            }
        }
        nodes
    }

    /// Histogram of primary ownership over a key sample.
    ///
    /// Diagnostic for validating balance; an empty ring yields an empty map.
    pub fn key_distribution<'a>(
        &self,
        sample_keys: impl IntoIterator<Item = &'a str>,
    ) -> BTreeMap<NodeId, usize> {
        let mut distribution = BTreeMap::new();
        for key in sample_keys {
            if let Ok(node_id) = self.get_node(key) {
                *distribution.entry(node_id).or_insert(0) += 1;
            }
        }
        distribution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_ring_fails_lookup() {
        let ring = HashRing::with_default_vnodes([]);
        assert!(matches!(ring.get_node("k"), Err(Error::EmptyRing)));
        assert!(ring.get_nodes_for_replication("k", 2).is_empty());
    }

    #[test]
    fn test_lookup_is_deterministic() {
        let ring_a = HashRing::with_default_vnodes([1, 2, 3]);
        let ring_b = HashRing::with_default_vnodes([3, 1, 2]);
        for i in 0..100 {
            let key = format!("key{i}");
            let a = ring_a.get_node(&key).unwrap();
            assert_eq!(a, ring_a.get_node(&key).unwrap());
            // Insertion order must not matter.
            assert_eq!(a, ring_b.get_node(&key).unwrap());
        }
    }

    #[test]
    fn test_replication_list_is_distinct_and_bounded() {
        let ring = HashRing::with_default_vnodes([1, 2, 3]);
        let nodes = ring.get_nodes_for_replication("user:123", 2);
        assert_eq!(nodes.len(), 2);
        assert_ne!(nodes[0], nodes[1]);
        assert_eq!(nodes[0], ring.get_node("user:123").unwrap());

        // Asking for more replicas than nodes caps at the node count.
        let all = ring.get_nodes_for_replication("user:123", 10);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_add_node_is_idempotent() {
        let mut ring = HashRing::with_default_vnodes([1, 2]);
        let before = ring.get_node("k").unwrap();
        ring.add_node(1);
        assert_eq!(ring.node_count(), 2);
        assert_eq!(ring.get_node("k").unwrap(), before);
    }

    #[test]
    fn test_remove_node_reroutes_only_its_keys() {
        let ring = HashRing::with_default_vnodes([1, 2, 3]);
        let keys: Vec<String> = (0..1000).map(|i| format!("k_{i}")).collect();

        let mut owned_by_2 = Vec::new();
        let mut owned_by_others = Vec::new();
        for key in &keys {
            if ring.get_node(key).unwrap() == 2 {
                owned_by_2.push(key.clone());
            } else {
                owned_by_others.push((key.clone(), ring.get_node(key).unwrap()));
            }
        }

        let mut shrunk = ring.clone();
        shrunk.remove_node(2);
        // Keys not owned by the removed node keep their primary.
        for (key, owner) in &owned_by_others {
            assert_eq!(shrunk.get_node(key).unwrap(), *owner);
        }
        // Keys owned by the removed node land on some remaining node.
        for key in &owned_by_2 {
            assert_ne!(shrunk.get_node(key).unwrap(), 2);
        }
    }

    #[test]
    fn test_distribution_is_roughly_even() {
        let ring = HashRing::with_default_vnodes([1, 2, 3]);
        let keys: Vec<String> = (0..3000).map(|i| format!("key{i}")).collect();
        let distribution = ring.key_distribution(keys.iter().map(String::as_str));

        assert_eq!(distribution.len(), 3);
        for (&node_id, &count) in &distribution {
            // With V=150 the per-node share should sit well inside
            // one-sixth to one-half for 3 nodes.
            assert!(
                count > 500 && count < 1500,
                "node {node_id} owns {count} of 3000 keys"
            );
        }
    }

    #[test]
    fn test_single_node_owns_everything() {
        let ring = HashRing::with_default_vnodes([7]);
        for i in 0..50 {
            assert_eq!(ring.get_node(&format!("k{i}")).unwrap(), 7);
        }
        assert_eq!(ring.get_nodes_for_replication("k", 3), vec![7]);
    }

    proptest! {
        #[test]
        fn prop_lookup_total_and_stable(key in "[a-zA-Z0-9:_-]{1,32}") {
            let ring = HashRing::with_default_vnodes([1, 2, 3, 4, 5]);
            let first = ring.get_node(&key).unwrap();
            prop_assert_eq!(first, ring.get_node(&key).unwrap());
            prop_assert!((1..=5).contains(&first));
        }

        #[test]
        fn prop_replication_starts_at_primary(key in "[a-z0-9]{1,24}", n in 1usize..6) {
            let ring = HashRing::with_default_vnodes([1, 2, 3]);
            let replicas = ring.get_nodes_for_replication(&key, n);
            prop_assert_eq!(replicas.len(), n.min(3));
            prop_assert_eq!(replicas[0], ring.get_node(&key).unwrap());
            let mut dedup = replicas.clone();
            dedup.sort_unstable();
            dedup.dedup();
            prop_assert_eq!(dedup.len(), replicas.len());
        }
    }
}
