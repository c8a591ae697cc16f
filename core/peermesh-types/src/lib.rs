//! Core type definitions for peermesh.
//!
//! This crate defines the fundamental types shared by the CRDT kernel,
//! the replica registry, and the synchronization channel:
//! - [`NodeId`] — replica author identity (opaque non-empty string)
//! - [`Key`] — registry key under which a replica is stored
//! - [`SeqGen`] — per-process strictly increasing sequence source
//! - [`wall_clock_micros`] — best-effort microsecond wall clock
//!
//! Domain-specific types (CRDT payloads, protocol envelopes, profiles)
//! belong to their respective crates, not here.

mod ids;
mod timestamp;

pub use ids::{Key, NodeId};
pub use timestamp::{wall_clock_micros, SeqGen};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur constructing core types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("node id must be a non-empty string")]
    EmptyNodeId,

    #[error("key must be a non-empty string")]
    EmptyKey,

    #[error("key must not contain NUL bytes")]
    KeyContainsNul,
}
