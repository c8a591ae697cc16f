//! Grow-only counter CRDT.
//!
//! Each node owns one entry in the counts map and only ever raises it.
//! The counter value is the sum of all entries; merge takes the
//! entry-wise maximum. An absent entry reads as zero, and zero-valued
//! entries are never stored so that structural equality matches value
//! equality.

use peermesh_types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A grow-only counter.
///
/// Only the owning node may raise its entry; the protocol layer rejects
/// commands that would mutate another node's entry on a peer's behalf.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GCounter {
    counts: HashMap<NodeId, u64>,
}

impl GCounter {
    /// Creates a counter with value 0 — the identity of merge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a counter from raw entries, dropping zero entries.
    #[must_use]
    pub fn from_counts(counts: HashMap<NodeId, u64>) -> Self {
        Self {
            counts: counts.into_iter().filter(|(_, n)| *n > 0).collect(),
        }
    }

    /// Increments the entry for `node` by 1.
    pub fn increment(&mut self, node: &NodeId) {
        self.increment_by(node, 1);
    }

    /// Increments the entry for `node` by `amount`.
    ///
    /// An amount of zero leaves the counter untouched.
    pub fn increment_by(&mut self, node: &NodeId, amount: u64) {
        if amount == 0 {
            return;
        }
        *self.counts.entry(node.clone()).or_insert(0) += amount;
    }

    /// Returns the entry for `node` (0 if absent).
    #[must_use]
    pub fn get(&self, node: &NodeId) -> u64 {
        self.counts.get(node).copied().unwrap_or(0)
    }

    /// Returns the counter value: the sum of all entries.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Returns the raw per-node entries.
    #[must_use]
    pub fn counts(&self) -> &HashMap<NodeId, u64> {
        &self.counts
    }

    /// Merges another counter into this one (entry-wise max).
    pub fn merge(&mut self, other: &Self) {
        for (node, &count) in &other.counts {
            let entry = self.counts.entry(node.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
    }

    /// Returns a new counter that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Computes the delta from this (older) counter to `newer`.
    ///
    /// The delta holds exactly the entries where `newer` is ahead, so
    /// `self.merged(&delta) == newer` whenever `self.le(newer)`. Returns
    /// the empty counter when `newer` holds nothing new.
    #[must_use]
    pub fn delta(&self, newer: &Self) -> Self {
        let counts = newer
            .counts
            .iter()
            .filter(|(node, &count)| count > self.get(node))
            .map(|(node, &count)| (node.clone(), count))
            .collect();
        Self { counts }
    }

    /// Entry-wise partial order: true iff every entry of `self` is at
    /// most the corresponding entry of `other`.
    #[must_use]
    pub fn le(&self, other: &Self) -> bool {
        self.counts
            .iter()
            .all(|(node, &count)| count <= other.get(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    #[test]
    fn new_counter_is_zero() {
        let c = GCounter::new();
        assert_eq!(c.value(), 0);
        assert_eq!(c.get(&node("A")), 0);
    }

    #[test]
    fn increment_raises_own_entry_only() {
        let mut c = GCounter::new();
        c.increment(&node("A"));
        c.increment(&node("A"));
        c.increment_by(&node("B"), 5);
        assert_eq!(c.get(&node("A")), 2);
        assert_eq!(c.get(&node("B")), 5);
        assert_eq!(c.value(), 7);
    }

    #[test]
    fn increment_by_zero_is_noop() {
        let mut c = GCounter::new();
        c.increment_by(&node("A"), 0);
        assert_eq!(c, GCounter::new());
    }

    #[test]
    fn merge_takes_entrywise_max() {
        let mut a = GCounter::new();
        a.increment_by(&node("A"), 5);
        let mut b = GCounter::new();
        b.increment_by(&node("A"), 3);
        b.increment_by(&node("B"), 2);

        let merged = a.merged(&b);
        assert_eq!(merged.get(&node("A")), 5);
        assert_eq!(merged.get(&node("B")), 2);
        assert_eq!(merged.value(), 7);
    }

    #[test]
    fn merge_is_commutative_associative_idempotent() {
        let mut a = GCounter::new();
        a.increment_by(&node("A"), 3);
        let mut b = GCounter::new();
        b.increment_by(&node("B"), 5);
        let mut c = GCounter::new();
        c.increment_by(&node("C"), 1);

        assert_eq!(a.merged(&b), b.merged(&a));
        assert_eq!(a.merged(&b).merged(&c), a.merged(&b.merged(&c)));
        assert_eq!(a.merged(&a), a);
    }

    #[test]
    fn delta_contains_only_advanced_entries() {
        let mut old = GCounter::new();
        old.increment_by(&node("A"), 3);
        old.increment_by(&node("B"), 2);

        let mut new = old.clone();
        new.increment_by(&node("B"), 3);

        let delta = old.delta(&new);
        assert_eq!(delta.get(&node("A")), 0);
        assert_eq!(delta.get(&node("B")), 5);
        assert_eq!(old.merged(&delta), new);
    }

    #[test]
    fn delta_of_unchanged_state_is_empty() {
        let mut c = GCounter::new();
        c.increment_by(&node("A"), 4);
        assert_eq!(c.delta(&c), GCounter::new());
    }

    #[test]
    fn partial_order_le() {
        let mut small = GCounter::new();
        small.increment_by(&node("A"), 1);
        let mut big = small.clone();
        big.increment_by(&node("A"), 1);
        big.increment_by(&node("B"), 1);

        assert!(small.le(&big));
        assert!(!big.le(&small));
        assert!(GCounter::new().le(&small));
    }

    #[test]
    fn mutator_is_inflationary() {
        let mut c = GCounter::new();
        c.increment_by(&node("A"), 2);
        let before = c.clone();
        c.increment(&node("A"));
        assert_eq!(before.merged(&c), c);
    }

    #[test]
    fn from_counts_drops_zero_entries() {
        let mut raw = HashMap::new();
        raw.insert(node("A"), 0);
        raw.insert(node("B"), 7);
        let c = GCounter::from_counts(raw);
        assert_eq!(c.counts().len(), 1);
        assert_eq!(c.value(), 7);
    }
}
