//! The synchronization channel for peermesh.
//!
//! A [`Session`] is the per-peer coordinator: it authenticates a
//! connecting peer, registers it with the capability [`policy`], hosts
//! one logical topic join, routes commands through the
//! [`CommandProcessor`] into the registry, and forwards registry
//! broadcasts back over the peer's [`transport`]. The session itself
//! holds no CRDT state; it is a thin routing and framing layer.

mod command;
mod policy;
mod protocol;
mod session;
pub mod transport;

pub use command::{Command, CommandKind, CommandProcessor};
pub use policy::{
    assign_profile, CapabilityReport, Connection, Effective, PolicyTable, Profile, ProfileConfig,
    Registration,
};
pub use protocol::{parse_topic, ClientFrame, ErrorBody, Reply, TOPIC_PREFIX};
pub use session::{ConnectParams, Session, SessionConfig};

use peermesh_crdt::{CrdtError, ReplicaKind};
use peermesh_registry::RegistryError;
use peermesh_types::Key;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Recoverable command and protocol errors, reported to the peer as an
/// error reply without closing the session (except [`Unauthorized`],
/// which is terminal per the protocol contract).
///
/// [`Unauthorized`]: ChannelError::Unauthorized
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    #[error("kind mismatch: key is bound to {expected}, command implies {actual}")]
    KindMismatch {
        expected: ReplicaKind,
        actual: ReplicaKind,
    },

    #[error("no replica stored under key `{0}`")]
    NotFound(Key),

    #[error("duplicate request `{0}` within the idempotency window")]
    Duplicate(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChannelError {
    /// The stable wire name of this error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCommand(_) => "invalid_command",
            Self::MissingField(_) => "missing_field",
            Self::UnknownCommand(_) => "unknown_command",
            Self::KindMismatch { .. } => "kind_mismatch",
            Self::NotFound(_) => "not_found",
            Self::Duplicate(_) => "duplicate",
            Self::Unauthorized(_) => "unauthorized",
            Self::Internal(_) => "internal",
        }
    }

    /// True for errors that close the session instead of merely
    /// producing an error reply.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::Internal(_))
    }
}

impl From<CrdtError> for ChannelError {
    fn from(err: CrdtError) -> Self {
        match err {
            CrdtError::KindMismatch { expected, actual } => {
                Self::KindMismatch { expected, actual }
            }
            CrdtError::UnknownKind(kind) => {
                Self::InvalidCommand(format!("unknown crdt kind `{kind}`"))
            }
            CrdtError::Payload(e) => Self::InvalidCommand(format!("malformed state: {e}")),
        }
    }
}

impl From<RegistryError> for ChannelError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(key) => Self::NotFound(key),
            RegistryError::Crdt(e) => e.into(),
        }
    }
}
