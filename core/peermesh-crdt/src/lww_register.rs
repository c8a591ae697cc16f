//! Last-writer-wins register CRDT.
//!
//! Stores a single opaque JSON payload. Concurrent writes are resolved
//! by comparing `(timestamp, author)` pairs lexicographically: the
//! larger timestamp wins, ties fall to the lexicographically larger
//! author string, and an exact tie means the sides are interchangeable
//! (the receiving side is kept).
//!
//! Timestamps are wall-clock microseconds, but only local monotonicity
//! matters: [`LwwRegister::set`] assigns `max(current + 1, wall clock)`
//! so a later write at the same replica can never tie with an earlier
//! one.

use peermesh_types::{wall_clock_micros, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A last-writer-wins register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LwwRegister {
    value: Value,
    timestamp: u64,
    author: NodeId,
}

impl LwwRegister {
    /// Creates an unset register — the identity of merge.
    ///
    /// Null value, timestamp 0, and the unset author, which compares
    /// below every real node so any genuine write beats it.
    #[must_use]
    pub fn unset() -> Self {
        Self {
            value: Value::Null,
            timestamp: 0,
            author: NodeId::unset(),
        }
    }

    /// Rebuilds a register from wire parts.
    #[must_use]
    pub fn from_parts(value: Value, timestamp: u64, author: NodeId) -> Self {
        Self {
            value,
            timestamp,
            author,
        }
    }

    /// Returns the current value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Returns the timestamp of the winning write.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Returns the author of the winning write.
    #[must_use]
    pub fn author(&self) -> &NodeId {
        &self.author
    }

    /// Assigns a new value as a local write by `author`.
    ///
    /// The assigned timestamp is strictly greater than any previously
    /// observed locally for this register.
    pub fn set(&mut self, value: Value, author: &NodeId) {
        self.timestamp = (self.timestamp + 1).max(wall_clock_micros());
        self.value = value;
        self.author = author.clone();
    }

    /// Applies a write carrying an explicit timestamp (remote or
    /// replayed). Returns true if the write won.
    pub fn write(&mut self, value: Value, timestamp: u64, author: &NodeId) -> bool {
        if self.loses_to(timestamp, author) {
            self.value = value;
            self.timestamp = timestamp;
            self.author = author.clone();
            true
        } else {
            false
        }
    }

    /// True iff an incoming `(timestamp, author)` pair beats the
    /// current one. An exact tie keeps the current side.
    fn loses_to(&self, timestamp: u64, author: &NodeId) -> bool {
        (timestamp, author) > (self.timestamp, &self.author)
    }

    /// Merges another register into this one.
    pub fn merge(&mut self, other: &Self) {
        if self.loses_to(other.timestamp, &other.author) {
            self.value = other.value.clone();
            self.timestamp = other.timestamp;
            self.author = other.author.clone();
        }
    }

    /// Returns a new register that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Computes the delta from this (older) register to `newer`: the
    /// whole newer register if it wins, the unset register otherwise.
    #[must_use]
    pub fn delta(&self, newer: &Self) -> Self {
        if self.loses_to(newer.timestamp, &newer.author) {
            newer.clone()
        } else {
            Self::unset()
        }
    }
}

impl Default for LwwRegister {
    fn default() -> Self {
        Self::unset()
    }
}
