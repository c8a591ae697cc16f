//! Kind-tagged replica values.
//!
//! The registry stores [`Replica`]s: one of the four CRDT kinds plus an
//! advisory version counter. The version is incremented on each local
//! operation and carried on the wire for observability; it is never
//! consulted for correctness.

use crate::{wire, CrdtError, GCounter, LwwRegister, OrSet, PnCounter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The kind tag of a replica, as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaKind {
    GCounter,
    PnCounter,
    LwwRegister,
    OrSet,
}

impl ReplicaKind {
    /// The wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GCounter => "g_counter",
            Self::PnCounter => "pn_counter",
            Self::LwwRegister => "lww_register",
            Self::OrSet => "or_set",
        }
    }

    /// Parses a wire name; unknown names yield a typed error.
    pub fn parse(s: &str) -> Result<Self, CrdtError> {
        match s {
            "g_counter" => Ok(Self::GCounter),
            "pn_counter" => Ok(Self::PnCounter),
            "lww_register" => Ok(Self::LwwRegister),
            "or_set" => Ok(Self::OrSet),
            other => Err(CrdtError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for ReplicaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The CRDT value held by a replica.
#[derive(Debug, Clone, PartialEq)]
pub enum State {
    GCounter(GCounter),
    PnCounter(PnCounter),
    LwwRegister(LwwRegister),
    OrSet(OrSet),
}

impl State {
    /// The kind tag of this value.
    #[must_use]
    pub fn kind(&self) -> ReplicaKind {
        match self {
            Self::GCounter(_) => ReplicaKind::GCounter,
            Self::PnCounter(_) => ReplicaKind::PnCounter,
            Self::LwwRegister(_) => ReplicaKind::LwwRegister,
            Self::OrSet(_) => ReplicaKind::OrSet,
        }
    }
}

/// A stored CRDT value tagged with its kind, plus the advisory version.
#[derive(Debug, Clone, PartialEq)]
pub struct Replica {
    state: State,
    version: u64,
}

impl Replica {
    /// Creates the empty replica of the given kind — the identity of
    /// merge for that kind.
    #[must_use]
    pub fn empty(kind: ReplicaKind) -> Self {
        let state = match kind {
            ReplicaKind::GCounter => State::GCounter(GCounter::new()),
            ReplicaKind::PnCounter => State::PnCounter(PnCounter::new()),
            ReplicaKind::LwwRegister => State::LwwRegister(LwwRegister::unset()),
            ReplicaKind::OrSet => State::OrSet(OrSet::new()),
        };
        Self { state, version: 0 }
    }

    /// Wraps a CRDT value with an explicit version.
    #[must_use]
    pub fn from_state(state: State, version: u64) -> Self {
        Self { state, version }
    }

    /// The kind tag.
    #[must_use]
    pub fn kind(&self) -> ReplicaKind {
        self.state.kind()
    }

    /// The advisory version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Increments the advisory version; called once per local mutation.
    pub fn bump(&mut self) {
        self.version += 1;
    }

    /// The CRDT value.
    #[must_use]
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Mutable access for local mutators. Callers bump the version
    /// themselves once the mutation commits.
    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    /// Merges another replica of the same kind into this one.
    ///
    /// The advisory version becomes the max of both sides.
    pub fn merge(&mut self, other: &Self) -> Result<(), CrdtError> {
        match (&mut self.state, &other.state) {
            (State::GCounter(a), State::GCounter(b)) => a.merge(b),
            (State::PnCounter(a), State::PnCounter(b)) => a.merge(b),
            (State::LwwRegister(a), State::LwwRegister(b)) => a.merge(b),
            (State::OrSet(a), State::OrSet(b)) => a.merge(b),
            _ => {
                return Err(CrdtError::KindMismatch {
                    expected: self.kind(),
                    actual: other.kind(),
                })
            }
        }
        self.version = self.version.max(other.version);
        Ok(())
    }

    /// Returns a new replica that is the merge of this and another.
    pub fn merged(&self, other: &Self) -> Result<Self, CrdtError> {
        let mut result = self.clone();
        result.merge(other)?;
        Ok(result)
    }

    /// Computes the delta from this (older) replica to `newer`.
    pub fn delta(&self, newer: &Self) -> Result<Self, CrdtError> {
        let state = match (&self.state, &newer.state) {
            (State::GCounter(a), State::GCounter(b)) => State::GCounter(a.delta(b)),
            (State::PnCounter(a), State::PnCounter(b)) => State::PnCounter(a.delta(b)),
            (State::LwwRegister(a), State::LwwRegister(b)) => State::LwwRegister(a.delta(b)),
            (State::OrSet(a), State::OrSet(b)) => State::OrSet(a.delta(b)),
            _ => {
                return Err(CrdtError::KindMismatch {
                    expected: self.kind(),
                    actual: newer.kind(),
                })
            }
        };
        Ok(Self {
            state,
            version: newer.version,
        })
    }

    /// The queried value of the replica, as seen by clients:
    /// counter sum, register payload, or sorted element list.
    #[must_use]
    pub fn value(&self) -> Value {
        match &self.state {
            State::GCounter(c) => Value::from(c.value()),
            State::PnCounter(c) => Value::from(c.value()),
            State::LwwRegister(r) => r.value().clone(),
            State::OrSet(s) => {
                let mut elements: Vec<&str> = s.iter().collect();
                elements.sort_unstable();
                Value::from(elements)
            }
        }
    }

    /// Encodes to the JSON wire form.
    #[must_use]
    pub fn encode(&self) -> Value {
        wire::encode(self)
    }

    /// Decodes from the JSON wire form.
    pub fn decode(value: &Value) -> Result<Self, CrdtError> {
        wire::decode(value)
    }
}
