//! Positive-negative counter CRDT.
//!
//! An ordered pair of two grow-only counters. Increments land in the
//! positive half, decrements in the negative half; the value is the
//! difference and may go negative. No underflow handling is needed
//! because both halves only ever grow.

use crate::GCounter;
use peermesh_types::NodeId;
use serde::{Deserialize, Serialize};

/// A positive-negative counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnCounter {
    positive: GCounter,
    negative: GCounter,
}

impl PnCounter {
    /// Creates a counter with value 0 — the identity of merge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a counter from its two halves.
    #[must_use]
    pub fn from_parts(positive: GCounter, negative: GCounter) -> Self {
        Self { positive, negative }
    }

    /// Increments the counter by 1 for `node`.
    pub fn increment(&mut self, node: &NodeId) {
        self.positive.increment(node);
    }

    /// Increments the counter by `amount` for `node`.
    pub fn increment_by(&mut self, node: &NodeId, amount: u64) {
        self.positive.increment_by(node, amount);
    }

    /// Decrements the counter by 1 for `node`.
    pub fn decrement(&mut self, node: &NodeId) {
        self.negative.increment(node);
    }

    /// Decrements the counter by `amount` for `node`.
    pub fn decrement_by(&mut self, node: &NodeId, amount: u64) {
        self.negative.increment_by(node, amount);
    }

    /// Returns the current value (may be negative).
    #[must_use]
    pub fn value(&self) -> i64 {
        self.positive.value() as i64 - self.negative.value() as i64
    }

    /// The positive half.
    #[must_use]
    pub fn positive(&self) -> &GCounter {
        &self.positive
    }

    /// The negative half.
    #[must_use]
    pub fn negative(&self) -> &GCounter {
        &self.negative
    }

    /// Merges another counter into this one (entry-wise max per half).
    pub fn merge(&mut self, other: &Self) {
        self.positive.merge(&other.positive);
        self.negative.merge(&other.negative);
    }

    /// Returns a new counter that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Computes the delta from this (older) counter to `newer`,
    /// half by half.
    #[must_use]
    pub fn delta(&self, newer: &Self) -> Self {
        Self {
            positive: self.positive.delta(&newer.positive),
            negative: self.negative.delta(&newer.negative),
        }
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
        assert_eq!(PnCounter::new().value(), 0);
    }

    #[test]
    fn value_can_go_negative() {
        let mut c = PnCounter::new();
        c.decrement_by(&node("A"), 5);
        assert_eq!(c.value(), -5);
    }

    #[test]
    fn increments_and_decrements_combine() {
        let mut c = PnCounter::new();
        c.increment_by(&node("A"), 10);
        c.decrement_by(&node("A"), 3);
        c.decrement(&node("B"));
        assert_eq!(c.value(), 6);
    }

    #[test]
    fn merge_is_commutative() {
        let mut a = PnCounter::new();
        a.increment_by(&node("A"), 3);
        a.decrement_by(&node("B"), 1);

        let mut b = PnCounter::new();
        b.increment_by(&node("B"), 5);
        b.decrement_by(&node("A"), 2);

        assert_eq!(a.merged(&b), b.merged(&a));
    }

    #[test]
    fn merge_is_idempotent() {
        let mut a = PnCounter::new();
        a.increment_by(&node("A"), 5);
        a.decrement_by(&node("B"), 2);
        assert_eq!(a.merged(&a), a);
    }

    #[test]
    fn three_replica_convergence() {
        let mut a = PnCounter::new();
        let mut b = PnCounter::new();
        let mut c = PnCounter::new();

        a.increment_by(&node("A"), 10);
        b.increment_by(&node("B"), 20);
        b.decrement_by(&node("B"), 5);
        c.decrement_by(&node("C"), 3);

        let (sa, sb, sc) = (a.clone(), b.clone(), c.clone());
        a.merge(&sb);
        a.merge(&sc);
        b.merge(&sa);
        b.merge(&sc);
        c.merge(&sa);
        c.merge(&sb);

        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.value(), 22);
    }

    #[test]
    fn delta_round_trips_per_half() {
        let mut old = PnCounter::new();
        old.increment_by(&node("A"), 2);
        let mut new = old.clone();
        new.decrement_by(&node("B"), 4);
        new.increment(&node("A"));

        let delta = old.delta(&new);
        assert_eq!(old.merged(&delta), new);
    }
}
