//! CRDT implementations for peermesh.
//!
//! This crate provides the state-based Conflict-free Replicated Data
//! Types shared by the server and every browser peer:
//!
//! - [`GCounter`] — grow-only counter
//! - [`PnCounter`] — positive-negative counter for distributed inc/dec
//! - [`LwwRegister`] — last-writer-wins register for single values
//! - [`OrSet`] — observed-remove set with add-wins semantics
//!
//! plus [`Replica`], the kind-tagged value stored by the registry, and
//! the JSON wire codec in [`wire`].
//!
//! All CRDTs in this crate satisfy the following properties:
//! - **Commutative**: merge(a, b) == merge(b, a)
//! - **Associative**: merge(merge(a, b), c) == merge(a, merge(b, c))
//! - **Idempotent**: merge(a, a) == a
//!
//! These properties ensure that replicas converge to the same state
//! regardless of the order in which states are exchanged. Each kind
//! also carries a delta form: `merge(old, delta(old, new)) == new` for
//! any `new` reachable from `old` by mutators.

mod g_counter;
mod lww_register;
mod or_set;
mod pn_counter;
mod replica;
pub mod wire;

pub use g_counter::GCounter;
pub use lww_register::LwwRegister;
pub use or_set::{OrSet, Tag};
pub use pn_counter::PnCounter;
pub use replica::{Replica, ReplicaKind, State};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, CrdtError>;

/// Errors surfaced by the kernel at its boundaries.
#[derive(Debug, thiserror::Error)]
pub enum CrdtError {
    /// The wire envelope named a kind this kernel does not implement.
    #[error("unknown crdt kind `{0}`")]
    UnknownKind(String),

    /// Two replicas of different kinds were combined.
    #[error("kind mismatch: expected {expected}, got {actual}")]
    KindMismatch {
        expected: ReplicaKind,
        actual: ReplicaKind,
    },

    /// The payload did not match the shape its kind requires.
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}
