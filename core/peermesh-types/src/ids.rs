//! Identifier types used throughout the peermesh core.
//!
//! Both identifiers are opaque strings with light validation at the
//! construction boundary. Node identity is stable for the lifetime of a
//! session but is never globally registered.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a replica author.
///
/// Any peer, including the server, may be a node. Ordering is plain
/// lexicographic string order, which makes the empty string the smallest
/// possible author; the LWW register relies on that for tie-breaking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node id, rejecting the empty string.
    pub fn new(id: impl Into<String>) -> Result<Self, Error> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::EmptyNodeId);
        }
        Ok(Self(id))
    }

    /// The sentinel author carried by an unset LWW register.
    ///
    /// Never a valid session identity; compares below every real node.
    #[must_use]
    pub fn unset() -> Self {
        Self(String::new())
    }

    /// Returns the string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Registry key under which a replica is stored and synchronized.
///
/// The join topic form is `"crdt:" + key`. Keys are opaque non-empty
/// strings without embedded NUL bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// Creates a key, rejecting empty strings and embedded NULs.
    pub fn new(key: impl Into<String>) -> Result<Self, Error> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        if key.contains('\0') {
            return Err(Error::KeyContainsNul);
        }
        Ok(Self(key))
    }

    /// Returns the string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
