//! Sorted-leaf Merkle tree over one node's data.
//!
//! Leaf for key k is `SHA-256("<k>:<canonical_json(value)>")`, taken in
//! sorted key order. Parent levels pair adjacent hex digests left to right
//! (an odd tail is duplicated) and hash the concatenation. Two nodes whose
//! roots match hold identical data; when roots differ, a flat leaf diff
//! yields the keys only on one side and the keys held by both with
//! differing values.

use ringkv_core::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Divergence between two trees' leaf sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerkleDiff {
    /// Keys present only in the tree `diff` was called on.
    pub only_in_self: BTreeSet<String>,
    /// Keys present only in the other tree.
    pub only_in_other: BTreeSet<String>,
    /// Keys present in both with differing leaf hashes.
    pub conflicts: BTreeSet<String>,
}

impl MerkleDiff {
    /// Whether the two leaf sets were identical.
    pub fn is_empty(&self) -> bool {
        self.only_in_self.is_empty() && self.only_in_other.is_empty() && self.conflicts.is_empty()
    }
}

/// Merkle tree built over a snapshot of key/value data.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    leaves: BTreeMap<String, String>,
    root: String,
}

impl MerkleTree {
    /// Build the tree. Keys are hashed in sorted order so equal data
    /// always yields equal roots.
    pub fn build(data: &BTreeMap<String, Value>) -> Self {
        let leaves: BTreeMap<String, String> = data
            .iter()
            .map(|(key, value)| {
                let hash = sha256_hex(&format!("{key}:{}", value.canonical_json()));
                (key.clone(), hash)
            })
            .collect();

        let mut level: Vec<String> = leaves.values().cloned().collect();
        if level.is_empty() {
            return Self {
                leaves,
                root: sha256_hex(""),
            };
        }
        while level.len() > 1 {
            let mut parents = Vec::with_capacity(level.len().div_ceil(2));
            for pair in level.chunks(2) {
                let combined = match pair {
                    [left, right] => format!("{left}{right}"),
                    // Odd count: duplicate the final hash.
                    [lone] => format!("{lone}{lone}"),
                    _ => unreachable!("chunks(2) yields 1- or 2-element slices"),
                };
                parents.push(sha256_hex(&combined));
            }
            level = parents;
        }
        let root = level.remove(0);
        Self { leaves, root }
    }

    /// Root hash of the whole tree.
    pub fn root_hash(&self) -> &str {
        &self.root
    }

    /// Leaf hash for one key, `None` if the key is absent.
    pub fn leaf_hash(&self, key: &str) -> Option<&str> {
        self.leaves.get(key).map(String::as_str)
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Whether the tree has no leaves.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Flat leaf diff against another tree.
    pub fn diff(&self, other: &MerkleTree) -> MerkleDiff {
        let mut diff = MerkleDiff::default();
        for (key, hash) in &self.leaves {
            match other.leaves.get(key) {
                None => {
                    diff.only_in_self.insert(key.clone());
                }
                Some(other_hash) if other_hash != hash => {
                    diff.conflicts.insert(key.clone());
                }
                Some(_) => {}
            }
        }
        for key in other.leaves.keys() {
            if !self.leaves.contains_key(key) {
                diff.only_in_other.insert(key.clone());
            }
        }
        diff
    }
}
