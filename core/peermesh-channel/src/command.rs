//! Command validation, dispatch, and idempotency gating.
//!
//! The processor turns validated command envelopes into registry
//! operations. It owns the per-session idempotency window: a
//! `request_id` seen again within the TTL yields a `duplicate` error
//! and no second state transition. A command counts as processed from
//! the moment its transition commits, so ids are recorded only after
//! a successful dispatch — a failed command may be retried under the
//! same id.

use crate::{ChannelError, Result};
use peermesh_crdt::{CrdtError, Replica, ReplicaKind, State};
use peermesh_registry::{Registry, SubscriberId};
use peermesh_types::{Key, NodeId, SeqGen};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// The recognized command verbs.
///
/// Wire frames use the bare form (`increment`); the dotted
/// `crdt.increment` aliases are accepted for callers addressing the
/// processor directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Increment,
    IncrementBy,
    Decrement,
    Set,
    Add,
    Remove,
    Merge,
    Sync,
}

impl CommandKind {
    /// Parses a command verb. Returns `None` for verbs the processor
    /// does not recognize (`join` and `leave` belong to the session).
    #[must_use]
    pub fn parse(event: &str) -> Option<Self> {
        let verb = event.strip_prefix("crdt.").unwrap_or(event);
        match verb {
            "increment" => Some(Self::Increment),
            "increment_by" => Some(Self::IncrementBy),
            "decrement" => Some(Self::Decrement),
            "set" => Some(Self::Set),
            "add" => Some(Self::Add),
            "remove" => Some(Self::Remove),
            "merge" => Some(Self::Merge),
            "sync" => Some(Self::Sync),
            _ => None,
        }
    }

    /// True for verbs that do not mutate the replica.
    #[must_use]
    fn is_read_only(&self) -> bool {
        matches!(self, Self::Sync)
    }
}

/// A validated-shape command envelope.
#[derive(Debug, Clone)]
pub struct Command {
    pub kind: CommandKind,
    pub payload: Value,
    pub request_id: Option<String>,
}

/// Bounded set of recently processed request ids.
///
/// Time-based: entries expire after the TTL and are pruned on access,
/// which bounds memory to the ids seen in one window.
#[derive(Debug)]
struct IdempotencyCache {
    ttl: Duration,
    seen: HashMap<String, Instant>,
}

impl IdempotencyCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: HashMap::new(),
        }
    }

    fn is_duplicate(&mut self, id: &str) -> bool {
        let now = Instant::now();
        self.seen.retain(|_, at| now.duration_since(*at) < self.ttl);
        self.seen.contains_key(id)
    }

    fn record(&mut self, id: String) {
        self.seen.insert(id, Instant::now());
    }
}

/// Per-session command processor.
///
/// Holds the session's node identity, a handle to the shared registry,
/// and the process-wide tag sequence for OR-set adds.
pub struct CommandProcessor {
    registry: Arc<Registry>,
    node: NodeId,
    seq: Arc<SeqGen>,
    cache: IdempotencyCache,
}

impl CommandProcessor {
    /// Creates a processor for one session.
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        node: NodeId,
        seq: Arc<SeqGen>,
        idempotency_ttl: Duration,
    ) -> Self {
        Self {
            registry,
            node,
            seq,
            cache: IdempotencyCache::new(idempotency_ttl),
        }
    }

    /// Executes a command against `key`.
    ///
    /// For mutators the returned replica is the committed new state;
    /// for `sync` it is the delta from the carried client state to the
    /// current replica.
    pub async fn execute(
        &mut self,
        key: &Key,
        origin: Option<SubscriberId>,
        command: Command,
    ) -> Result<Replica> {
        if !command.kind.is_read_only() {
            if let Some(id) = &command.request_id {
                if self.cache.is_duplicate(id) {
                    debug!(key = %key, request_id = %id, "duplicate command suppressed");
                    return Err(ChannelError::Duplicate(id.clone()));
                }
            }
        }

        let result = self.dispatch(key, origin, &command).await?;

        if !command.kind.is_read_only() {
            if let Some(id) = command.request_id {
                self.cache.record(id);
            }
        }
        Ok(result)
    }

    /// Validation and authorization run per arm before the key is
    /// touched: a rejected command must not bind a vacant key to a
    /// kind it never legitimately carried.
    async fn dispatch(
        &self,
        key: &Key,
        origin: Option<SubscriberId>,
        command: &Command,
    ) -> Result<Replica> {
        let payload = &command.payload;
        match command.kind {
            CommandKind::Increment => {
                let node = self.authorized_node(payload)?;
                self.ensure(key, ReplicaKind::GCounter).await?;
                self.update_g_counter(key, origin, move |c| c.increment(&node))
                    .await
            }
            CommandKind::IncrementBy => {
                let node = self.authorized_node(payload)?;
                let amount = field_u64(payload, "amount")?;
                self.ensure(key, ReplicaKind::GCounter).await?;
                self.update_g_counter(key, origin, move |c| c.increment_by(&node, amount))
                    .await
            }
            CommandKind::Decrement => {
                let node = self.authorized_node(payload)?;
                self.ensure(key, ReplicaKind::PnCounter).await?;
                let result = self
                    .registry
                    .update(key, origin, move |replica| match replica.state_mut() {
                        State::PnCounter(c) => {
                            c.decrement(&node);
                            Ok(())
                        }
                        other => Err(mismatch(other, ReplicaKind::PnCounter)),
                    })
                    .await?;
                Ok(result)
            }
            CommandKind::Set => {
                let node = self.authorized_node(payload)?;
                let value = field(payload, "value")?.clone();
                self.ensure(key, ReplicaKind::LwwRegister).await?;
                let result = self
                    .registry
                    .update(key, origin, move |replica| match replica.state_mut() {
                        State::LwwRegister(r) => {
                            r.set(value, &node);
                            Ok(())
                        }
                        other => Err(mismatch(other, ReplicaKind::LwwRegister)),
                    })
                    .await?;
                Ok(result)
            }
            CommandKind::Add => {
                let node = self.authorized_node(payload)?;
                let element = field_str(payload, "element")?.to_string();
                let seq = self.seq.clone();
                self.ensure(key, ReplicaKind::OrSet).await?;
                let result = self
                    .registry
                    .update(key, origin, move |replica| match replica.state_mut() {
                        State::OrSet(s) => {
                            s.add(element, &node, &seq);
                            Ok(())
                        }
                        other => Err(mismatch(other, ReplicaKind::OrSet)),
                    })
                    .await?;
                Ok(result)
            }
            CommandKind::Remove => {
                let element = field_str(payload, "element")?.to_string();
                self.ensure(key, ReplicaKind::OrSet).await?;
                let result = self
                    .registry
                    .update(key, origin, move |replica| match replica.state_mut() {
                        State::OrSet(s) => {
                            s.remove(&element);
                            Ok(())
                        }
                        other => Err(mismatch(other, ReplicaKind::OrSet)),
                    })
                    .await?;
                Ok(result)
            }
            CommandKind::Merge => {
                let state = field(payload, "state")?;
                let incoming = Replica::decode(state)?;
                let merged = self.registry.merge(key, incoming, origin).await?;
                Ok(merged)
            }
            CommandKind::Sync => {
                let state = field(payload, "state")?;
                let client = Replica::decode(state)?;
                self.registry.get_or_create(key, client.kind()).await?;
                let delta = self.registry.delta(key, &client).await?;
                Ok(delta)
            }
        }
    }

    /// Installs the empty replica of `kind` if the key is vacant;
    /// surfaces a kind mismatch if it is bound to something else.
    async fn ensure(&self, key: &Key, kind: ReplicaKind) -> Result<()> {
        self.registry.get_or_create(key, kind).await?;
        Ok(())
    }

    async fn update_g_counter<F>(
        &self,
        key: &Key,
        origin: Option<SubscriberId>,
        f: F,
    ) -> Result<Replica>
    where
        F: FnOnce(&mut peermesh_crdt::GCounter) + Send,
    {
        let result = self
            .registry
            .update(key, origin, move |replica| match replica.state_mut() {
                State::GCounter(c) => {
                    f(c);
                    Ok(())
                }
                other => Err(mismatch(other, ReplicaKind::GCounter)),
            })
            .await?;
        Ok(result)
    }

    /// Resolves the mutating node: the session's own identity. A
    /// `node_id` carried in the payload must agree — the protocol does
    /// not accept commands that mutate another node's entry on a
    /// peer's behalf.
    fn authorized_node(&self, payload: &Value) -> Result<NodeId> {
        if let Some(claimed) = payload.get("node_id") {
            let claimed = claimed
                .as_str()
                .ok_or_else(|| ChannelError::InvalidCommand("node_id must be a string".into()))?;
            if claimed != self.node.as_str() {
                return Err(ChannelError::Unauthorized(format!(
                    "command claims node `{claimed}` but the session is `{}`",
                    self.node
                )));
            }
        }
        Ok(self.node.clone())
    }
}

fn mismatch(stored: &State, implied: ReplicaKind) -> CrdtError {
    CrdtError::KindMismatch {
        expected: stored.kind(),
        actual: implied,
    }
}

fn field<'a>(payload: &'a Value, name: &'static str) -> Result<&'a Value> {
    payload
        .get(name)
        .ok_or(ChannelError::MissingField(name))
}

fn field_str<'a>(payload: &'a Value, name: &'static str) -> Result<&'a str> {
    field(payload, name)?
        .as_str()
        .ok_or_else(|| ChannelError::InvalidCommand(format!("{name} must be a string")))
}

fn field_u64(payload: &Value, name: &'static str) -> Result<u64> {
    field(payload, name)?
        .as_u64()
        .ok_or_else(|| ChannelError::InvalidCommand(format!("{name} must be a non-negative integer")))
}
