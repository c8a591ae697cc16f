//! Observed-remove set CRDT (add-wins).
//!
//! Every add creates a unique `(author, seq)` tag; an element is
//! present iff its tag-set is non-empty. Remove drops exactly the tags
//! observed at this replica, so a concurrent add elsewhere — carrying a
//! tag the remover never saw — survives the next merge. Merge is a
//! per-element union of tag-sets; no tombstone set is persisted.

use peermesh_types::{NodeId, SeqGen};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A unique tag identifying one add operation.
///
/// Uniqueness comes from the author's per-process sequence: different
/// authors occupy disjoint tag domains, and one author never reuses a
/// sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub author: NodeId,
    pub seq: u64,
}

/// An observed-remove set of string elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrSet {
    elements: HashMap<String, HashSet<Tag>>,
}

impl OrSet {
    /// Creates an empty set — the identity of merge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a set from raw element/tag entries, dropping elements
    /// with no tags.
    #[must_use]
    pub fn from_elements(elements: HashMap<String, HashSet<Tag>>) -> Self {
        Self {
            elements: elements
                .into_iter()
                .filter(|(_, tags)| !tags.is_empty())
                .collect(),
        }
    }

    /// True if the element has at least one live tag.
    #[must_use]
    pub fn contains(&self, element: &str) -> bool {
        self.elements.contains_key(element)
    }

    /// Number of present elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True if no element is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Iterates over the present elements.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.elements.keys().map(String::as_str)
    }

    /// The live tags for an element, if present.
    #[must_use]
    pub fn tags(&self, element: &str) -> Option<&HashSet<Tag>> {
        self.elements.get(element)
    }

    /// Raw element/tag entries.
    #[must_use]
    pub fn elements(&self) -> &HashMap<String, HashSet<Tag>> {
        &self.elements
    }

    /// Adds an element as `author`, drawing a fresh tag from `seq`.
    ///
    /// Returns the generated tag. Adding an element that is already
    /// present piles on another tag.
    pub fn add(&mut self, element: impl Into<String>, author: &NodeId, seq: &SeqGen) -> Tag {
        let tag = Tag {
            author: author.clone(),
            seq: seq.next(),
        };
        self.insert_tag(element, tag.clone());
        tag
    }

    /// Inserts a specific tag for an element (wire decode and replay).
    pub fn insert_tag(&mut self, element: impl Into<String>, tag: Tag) {
        self.elements.entry(element.into()).or_default().insert(tag);
    }

    /// Removes an element, dropping all tags currently observed at
    /// this replica. Returns the dropped tags.
    ///
    /// Author-agnostic: any node may remove any element. Tags added
    /// concurrently on another replica are untouched and will
    /// resurface the element on the next merge.
    pub fn remove(&mut self, element: &str) -> Vec<Tag> {
        self.elements
            .remove(element)
            .map(|tags| tags.into_iter().collect())
            .unwrap_or_default()
    }

    /// Merges another set into this one: per-element tag-set union.
    pub fn merge(&mut self, other: &Self) {
        for (element, tags) in &other.elements {
            self.elements
                .entry(element.clone())
                .or_default()
                .extend(tags.iter().cloned());
        }
    }

    /// Returns a new set that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Computes the delta from this (older) set to `newer`: every tag
    /// present in `newer` but not here, grouped by element.
    #[must_use]
    pub fn delta(&self, newer: &Self) -> Self {
        let mut delta = Self::new();
        for (element, tags) in &newer.elements {
            let known = self.elements.get(element);
            for tag in tags {
                if known.map_or(true, |k| !k.contains(tag)) {
                    delta.insert_tag(element.clone(), tag.clone());
                }
            }
        }
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    #[test]
    fn add_and_contains() {
        let seq = SeqGen::new();
        let mut set = OrSet::new();
        set.add("x", &node("A"), &seq);
        assert!(set.contains("x"));
        assert!(!set.contains("y"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn add_twice_piles_on_tags() {
        let seq = SeqGen::new();
        let mut set = OrSet::new();
        let t1 = set.add("x", &node("A"), &seq);
        let t2 = set.add("x", &node("A"), &seq);
        assert_ne!(t1, t2);
        assert_eq!(set.tags("x").unwrap().len(), 2);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_drops_observed_tags() {
        let seq = SeqGen::new();
        let mut set = OrSet::new();
        set.add("x", &node("A"), &seq);
        set.add("x", &node("A"), &seq);

        let dropped = set.remove("x");
        assert_eq!(dropped.len(), 2);
        assert!(!set.contains("x"));
        assert!(set.is_empty());
    }

    #[test]
    fn remove_missing_element_returns_nothing() {
        let mut set = OrSet::new();
        assert!(set.remove("ghost").is_empty());
    }

    #[test]
    fn concurrent_add_survives_remove() {
        // A adds "x" while offline; B adds and then removes its own "x".
        let seq_a = SeqGen::new();
        let seq_b = SeqGen::new();
        let mut a = OrSet::new();
        let mut b = OrSet::new();

        a.add("x", &node("A"), &seq_a);
        b.add("x", &node("B"), &seq_b);
        b.remove("x");
        assert!(!b.contains("x"));

        // A reconnects; its tag was never observed by B's remove.
        b.merge(&a);
        assert!(b.contains("x"));
        assert_eq!(b.tags("x").unwrap().len(), 1);
    }

    #[test]
    fn merge_laws_hold() {
        let seq = SeqGen::new();
        let mut a = OrSet::new();
        a.add("x", &node("A"), &seq);
        let mut b = OrSet::new();
        b.add("y", &node("B"), &seq);
        let mut c = OrSet::new();
        c.add("x", &node("C"), &seq);

        assert_eq!(a.merged(&b), b.merged(&a));
        assert_eq!(a.merged(&b).merged(&c), a.merged(&b.merged(&c)));
        assert_eq!(a.merged(&a), a);
    }

    #[test]
    fn delta_carries_only_unseen_tags() {
        let seq = SeqGen::new();
        let mut old = OrSet::new();
        old.add("x", &node("A"), &seq);

        let mut new = old.clone();
        new.add("x", &node("B"), &seq);
        new.add("y", &node("B"), &seq);

        let delta = old.delta(&new);
        assert_eq!(delta.tags("x").unwrap().len(), 1);
        assert!(delta.contains("y"));
        assert_eq!(old.merged(&delta), new);
    }

    #[test]
    fn delta_of_identical_sets_is_empty() {
        let seq = SeqGen::new();
        let mut set = OrSet::new();
        set.add("x", &node("A"), &seq);
        assert!(set.delta(&set).is_empty());
    }
}
