use siphasher::sip::SipHasher24;
use std::collections::HashSet;
use std::hash::Hasher;
use std::sync::Arc;

use crate::Error;

/// Virtual positions per unit of weight.
pub const DEFAULT_REPLICAS: u32 = 150;

/// Upper bound on virtual positions across the whole ring.
pub const MAX_VNODES: u64 = 1 << 22;

/// Anything that can be placed on a [`HashRing`].
///
/// The label is hashed to derive the node's virtual positions, so it must be
/// stable across processes for two routers to agree on placement.
pub trait RingNode {
    fn ring_label(&self) -> &str;
}

impl RingNode for String {
    fn ring_label(&self) -> &str {
        self
    }
}

impl RingNode for &str {
    fn ring_label(&self) -> &str {
        self
    }
}

impl<T: RingNode + ?Sized> RingNode for Arc<T> {
    fn ring_label(&self) -> &str {
        (**self).ring_label()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct RingEntry {
    position: u64,
    node: usize,
}

/// Weighted consistent hash ring.
///
/// Provides:
/// - `replicas * weight` virtual positions per node
/// - O(log V) lookups that never allocate
/// - Stable enumeration of nodes in construction order
///
/// Nodes are identified by their slot, not by label: two nodes built from
/// identical connection parameters are still two distinct members.
#[derive(Debug, Clone)]
pub struct HashRing<N> {
    nodes: Vec<N>,
    weights: Vec<u32>,
    labels: Vec<String>,
    entries: Vec<RingEntry>,
    replicas: u32,
}

impl<N: RingNode> HashRing<N> {
    /// Build a ring with [`DEFAULT_REPLICAS`] virtual positions per unit of weight.
    pub fn build<I>(nodes: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (N, u32)>,
    {
        Self::build_with_replicas(nodes, DEFAULT_REPLICAS)
    }

    /// Build a ring from `(node, weight)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `replicas` is zero, any weight is zero,
    /// `nodes` is empty, or the ring would need more than [`MAX_VNODES`]
    /// virtual positions.
    pub fn build_with_replicas<I>(nodes: I, replicas: u32) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (N, u32)>,
    {
        if replicas == 0 {
            return Err(Error::Config("replicas must be >= 1".to_string()));
        }

        let mut members = Vec::new();
        let mut weights = Vec::new();
        let mut labels = Vec::new();
        let mut used = HashSet::new();

        for (node, weight) in nodes {
            let base = node.ring_label().to_string();
            if weight == 0 {
                return Err(Error::Config(format!(
                    "weight for node '{}' must be a positive integer",
                    base
                )));
            }

            // Same label twice still means two members; give the later ones
            // their own positions.
            let mut label = base.clone();
            let mut occurrence = 0u32;
            while !used.insert(label.clone()) {
                occurrence += 1;
                label = format!("{}~{}", base, occurrence);
            }

            members.push(node);
            weights.push(weight);
            labels.push(label);
        }

        if members.is_empty() {
            return Err(Error::Config(
                "hash ring requires at least one node".to_string(),
            ));
        }

        let vnodes: u64 = weights
            .iter()
            .map(|&weight| u64::from(weight) * u64::from(replicas))
            .sum();
        if vnodes > MAX_VNODES {
            return Err(Error::Config(format!(
                "{} virtual nodes exceed the limit of {}; lower weights or replicas",
                vnodes, MAX_VNODES
            )));
        }
        let capacity = usize::try_from(vnodes).map_err(|_| {
            Error::Config(format!("{} virtual nodes do not fit in memory", vnodes))
        })?;

        let mut entries = Vec::with_capacity(capacity);
        for (node, (label, &weight)) in labels.iter().zip(&weights).enumerate() {
            for i in 0..u64::from(weight) * u64::from(replicas) {
                entries.push(RingEntry {
                    position: vnode_position(label, i),
                    node,
                });
            }
        }
        entries.sort_unstable();

        tracing::debug!(
            nodes = members.len(),
            vnodes = entries.len(),
            replicas,
            "Built hash ring"
        );

        Ok(Self {
            nodes: members,
            weights,
            labels,
            entries,
            replicas,
        })
    }

    /// Return the node that owns `key`.
    ///
    /// Callers that honor hash tags pass the result of [`crate::hash_key`].
    pub fn locate(&self, key: &[u8]) -> &N {
        &self.nodes[self.locate_index(key)]
    }

    /// Return the slot (construction index) of the node that owns `key`.
    pub fn locate_index(&self, key: &[u8]) -> usize {
        let position = key_position(key);
        let mut slot = self.entries.partition_point(|entry| entry.position < position);
        if slot == self.entries.len() {
            slot = 0;
        }
        self.entries[slot].node
    }

    /// All nodes in construction order.
    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    pub fn weight(&self, index: usize) -> Option<u32> {
        self.weights.get(index).copied()
    }

    /// The label actually hashed for the node at `index`, including any
    /// duplicate suffix.
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn vnode_count(&self) -> usize {
        self.entries.len()
    }

    pub fn total_weight(&self) -> u64 {
        self.weights.iter().map(|&w| u64::from(w)).sum()
    }

    pub fn replicas(&self) -> u32 {
        self.replicas
    }
}

#[inline]
fn key_position(key: &[u8]) -> u64 {
    let mut hasher = SipHasher24::new();
    hasher.write(key);
    hasher.finish()
}

fn vnode_position(label: &str, index: u64) -> u64 {
    key_position(format!("{}#{}", label, index).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(nodes: &[(&str, u32)]) -> HashRing<String> {
        HashRing::build(nodes.iter().map(|(n, w)| (n.to_string(), *w))).unwrap()
    }

    fn keys(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("key-{}", i)).collect()
    }

    #[test]
    fn test_hashring_single_node_owns_everything() {
        let ring = ring(&[("node-a", 1)]);
        for key in keys(100) {
            assert_eq!(ring.locate(key.as_bytes()), "node-a");
        }
    }

    #[test]
    fn test_hashring_vnode_count_follows_weight() {
        let ring = HashRing::build_with_replicas(
            vec![("a".to_string(), 1), ("b".to_string(), 1), ("c".to_string(), 2)],
            10,
        )
        .unwrap();
        assert_eq!(ring.node_count(), 3);
        assert_eq!(ring.vnode_count(), 40);
        assert_eq!(ring.total_weight(), 4);
        assert_eq!(ring.replicas(), 10);
    }

    #[test]
    fn test_hashring_entries_sorted() {
        let ring = ring(&[("a", 1), ("b", 3)]);
        assert!(ring
            .entries
            .windows(2)
            .all(|pair| pair[0].position <= pair[1].position));
    }

    #[test]
    fn test_hashring_consistent_assignment() {
        let ring = ring(&[("a", 1), ("b", 1), ("c", 1)]);
        for key in keys(1000) {
            let first = ring.locate_index(key.as_bytes());
            for _ in 0..3 {
                assert_eq!(ring.locate_index(key.as_bytes()), first);
            }
        }
    }

    #[test]
    fn test_hashring_independent_builds_agree() {
        let ring1 = ring(&[("a", 1), ("b", 2), ("c", 1)]);
        let ring2 = ring(&[("a", 1), ("b", 2), ("c", 1)]);
        for key in keys(1000) {
            assert_eq!(
                ring1.locate(key.as_bytes()),
                ring2.locate(key.as_bytes()),
                "Key {} should have same owner in both rings",
                key
            );
        }
    }

    #[test]
    fn test_hashring_two_nodes_split_work() {
        let ring = ring(&[("a", 1), ("b", 1)]);
        let total = 10_000;
        let on_a = keys(total)
            .iter()
            .filter(|k| ring.locate(k.as_bytes()) == "a")
            .count();

        let ratio = on_a as f64 / total as f64;
        assert!(
            (0.3..=0.7).contains(&ratio),
            "distribution too skewed: {on_a}/{total} ({ratio:.2})"
        );
    }

    #[test]
    fn test_hashring_weighted_distribution() {
        let ring = ring(&[("a", 1), ("b", 1), ("c", 2)]);
        let total = 20_000;
        let mut counts = [0usize; 3];
        for key in keys(total) {
            counts[ring.locate_index(key.as_bytes())] += 1;
        }

        let heavy = counts[2] as f64 / total as f64;
        assert!(
            (0.35..=0.65).contains(&heavy),
            "weight-2 node should own about half: {counts:?}"
        );
        for light in &counts[..2] {
            let share = *light as f64 / total as f64;
            assert!(
                (0.12..=0.38).contains(&share),
                "weight-1 node should own about a quarter: {counts:?}"
            );
        }
    }

    #[test]
    fn test_hashring_remove_node_only_its_keys_move() {
        let before = ring(&[("a", 1), ("b", 1), ("c", 2), ("d", 1), ("e", 3)]);
        let after = ring(&[("a", 1), ("b", 1), ("d", 1), ("e", 3)]);

        let total = 20_000;
        let mut moved = 0usize;
        for key in keys(total) {
            let old = before.locate(key.as_bytes());
            let new = after.locate(key.as_bytes());
            if old != "c" {
                assert_eq!(old, new, "key {key} was not on the removed node but moved");
            } else {
                moved += 1;
            }
        }

        // Removed weight 2 of 8: expect ~25%, allow up to 2x.
        let fraction = moved as f64 / total as f64;
        assert!(moved > 0);
        assert!(fraction <= 0.5, "too many keys moved: {fraction:.2}");
    }

    #[test]
    fn test_hashring_add_node_only_fraction_moves() {
        let before = ring(&[("a", 1), ("b", 1)]);
        let after = ring(&[("a", 1), ("b", 1), ("c", 1)]);

        let total = 10_000;
        let mut moved = 0usize;
        for key in keys(total) {
            let old = before.locate(key.as_bytes());
            let new = after.locate(key.as_bytes());
            if old != new {
                assert_eq!(new, "c", "keys may only move to the new node");
                moved += 1;
            }
        }

        let fraction = moved as f64 / total as f64;
        assert!(
            (0.1..=0.6).contains(&fraction),
            "unexpected share moved: {moved}/{total} ({fraction:.2})"
        );
    }

    #[test]
    fn test_hashring_wraps_past_last_position() {
        let ring = ring(&[("a", 1), ("b", 1), ("c", 1)]);
        let last = ring.entries[ring.entries.len() - 1].position;

        let key = (0..1_000_000)
            .map(|i| format!("wrap-{}", i))
            .find(|k| key_position(k.as_bytes()) > last)
            .unwrap();

        assert_eq!(ring.locate_index(key.as_bytes()), ring.entries[0].node);
    }

    #[test]
    fn test_hashring_duplicate_labels_are_distinct_members() {
        let ring = ring(&[("same:6379/0", 1), ("same:6379/0", 1)]);
        assert_eq!(ring.node_count(), 2);
        assert_eq!(ring.label(0), Some("same:6379/0"));
        assert_eq!(ring.label(1), Some("same:6379/0~1"));

        let mut seen = HashSet::new();
        for key in keys(1000) {
            seen.insert(ring.locate_index(key.as_bytes()));
        }
        assert_eq!(seen.len(), 2, "both duplicates should own keys");
    }

    #[test]
    fn test_hashring_nodes_in_construction_order() {
        let ring = ring(&[("z", 1), ("a", 3), ("m", 1)]);
        assert_eq!(ring.nodes(), ["z", "a", "m"]);
        assert_eq!(ring.weight(1), Some(3));
        assert_eq!(ring.weight(3), None);
    }

    #[test]
    fn test_hashring_rejects_empty_node_set() {
        let err = HashRing::<String>::build(Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_hashring_rejects_zero_weight() {
        let err = HashRing::build(vec![("a".to_string(), 1), ("b".to_string(), 0)]).unwrap_err();
        assert_eq!(
            err,
            Error::Config("weight for node 'b' must be a positive integer".to_string())
        );
    }

    #[test]
    fn test_hashring_rejects_zero_replicas() {
        let err = HashRing::build_with_replicas(vec![("a".to_string(), 1)], 0).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_hashring_rejects_oversized_weight() {
        let err = HashRing::build(vec![("a".to_string(), u32::MAX)]).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("exceed the limit")));
    }

    #[test]
    fn test_hashring_tagged_keys_colocate() {
        let ring = ring(&[("a", 1), ("b", 1), ("c", 2)]);
        for i in 0..200 {
            let tag = format!("user:{}", i);
            let plain = ring.locate(tag.as_bytes());
            let shadow = format!("{{{}}}shadow", tag);
            let other = format!("sessions:{{{}}}", tag);
            assert_eq!(ring.locate(crate::hash_key(shadow.as_bytes())), plain);
            assert_eq!(ring.locate(crate::hash_key(other.as_bytes())), plain);
        }
    }
}
