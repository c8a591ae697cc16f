//! Replica registry for peermesh.
//!
//! A single logical store of `Key → Replica` plus `Key → subscribers`,
//! shared by every session in the process. All single-key operations
//! are serialisable with respect to each other; nothing is ordered
//! across keys. Broadcasts fire after a state transition commits and
//! before the operation returns, and delivery to subscribers never
//! blocks.

mod registry;
mod subscriber;

pub use registry::Registry;
pub use subscriber::{StateUpdate, Subscriber, SubscriberId, SubscriberStats};

use peermesh_crdt::CrdtError;
use peermesh_types::Key;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors surfaced by registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The key holds no replica.
    #[error("no replica stored under key `{0}`")]
    NotFound(Key),

    /// Kind mismatch or malformed state from the kernel.
    #[error(transparent)]
    Crdt(#[from] CrdtError),
}
