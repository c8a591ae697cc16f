//! The per-peer session coordinator.
//!
//! Lifecycle:
//!
//! ```text
//!         connect                join ok          leave
//! INIT ───────────► AUTHENTICATED ─────► JOINED ──────► CLOSED
//!                         │                  │            ▲
//!                      reject              fatal ─────────┘
//! ```
//!
//! [`Session::connect`] is the INIT → AUTHENTICATED transition: it
//! validates the connect parameters and registers the peer with the
//! policy. [`Session::run`] then drives the message loop until the
//! peer leaves, the transport dies, or a fatal protocol error occurs.
//! One logical topic join is hosted at a time.
//!
//! Recoverable command errors (validation, kind mismatch, not-found,
//! duplicate) become error replies and leave the session open. Fatal
//! conditions (transport error, inbound decode error, backpressure
//! past the transport's threshold, unauthorized) close the session
//! with a reason the peer can distinguish from network loss. Every
//! exit path releases the subscription and the policy registration.

use crate::command::{Command, CommandKind, CommandProcessor};
use crate::policy::{CapabilityReport, PolicyTable, Profile};
use crate::protocol::{parse_topic, state_updated_frame, ClientFrame, Reply};
use crate::transport::{Inbound, SendStatus, Transport};
use crate::ChannelError;
use peermesh_crdt::{Replica, ReplicaKind};
use peermesh_registry::{Registry, StateUpdate, Subscriber, SubscriberId};
use peermesh_types::{Key, NodeId, SeqGen};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tunables for one session, supplied by the server at construction.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// CRDT kind a join presents for a key nobody has written yet.
    pub default_kind: ReplicaKind,
    /// Inactivity window; the session closes if no frame moves in it.
    pub keepalive: Duration,
    /// How long a request id blocks re-execution.
    pub idempotency_ttl: Duration,
    /// Broadcast buffer depth for this session's subscriber.
    pub subscriber_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_kind: ReplicaKind::GCounter,
            keepalive: Duration::from_secs(45),
            idempotency_ttl: Duration::from_secs(60),
            subscriber_capacity: 64,
        }
    }
}

/// Parameters carried by the connect request, once, at socket open.
#[derive(Debug, Clone, Default)]
pub struct ConnectParams {
    pub node_id: Option<String>,
    pub capabilities: Option<CapabilityReport>,
}

struct JoinedTopic {
    key: Key,
    subscriber_id: SubscriberId,
    updates: mpsc::Receiver<Arc<StateUpdate>>,
    /// Set when the update stream ends (key deleted); the session
    /// stays open but stops polling the stream.
    ended: bool,
}

enum Tick {
    Inbound(Inbound),
    Update(Option<Arc<StateUpdate>>),
    KeepaliveExpired,
}

/// A connected peer session.
pub struct Session<T: Transport> {
    id: Uuid,
    transport: T,
    registry: Arc<Registry>,
    policy: Arc<PolicyTable>,
    processor: CommandProcessor,
    node: NodeId,
    profile: Profile,
    config: SessionConfig,
    joined: Option<JoinedTopic>,
    last_activity: Instant,
}

impl<T: Transport> Session<T> {
    /// Authenticates a connecting peer and registers it with the
    /// policy.
    ///
    /// A missing or empty `node_id` rejects the connection: the
    /// transport is closed with an `unauthorized` reason and the error
    /// is returned.
    pub async fn connect(
        mut transport: T,
        registry: Arc<Registry>,
        policy: Arc<PolicyTable>,
        seq: Arc<SeqGen>,
        config: SessionConfig,
        params: ConnectParams,
    ) -> Result<Self, ChannelError> {
        let node = match params.node_id.map(NodeId::new) {
            Some(Ok(node)) => node,
            _ => {
                let err = ChannelError::Unauthorized("connect requires a node_id".into());
                transport.send(Reply::error(&err).to_bytes()).await;
                transport.close(Some(err.kind())).await;
                return Err(err);
            }
        };

        let report = params.capabilities.unwrap_or_default();
        let profile = policy.register(&node, report).await;
        let processor =
            CommandProcessor::new(registry.clone(), node.clone(), seq, config.idempotency_ttl);

        Ok(Self {
            id: Uuid::now_v7(),
            transport,
            registry,
            policy,
            processor,
            node,
            profile,
            config,
            joined: None,
            last_activity: Instant::now(),
        })
    }

    /// This session's node identity.
    #[must_use]
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// The delivery profile assigned at connect.
    #[must_use]
    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Drives the session until it closes, then releases every
    /// resource it held: subscription, policy registration, transport.
    pub async fn run(mut self) {
        info!(session = %self.id, node = %self.node, profile = %self.profile,
            "session started");
        let reason = self.serve().await;
        self.cleanup(reason.as_deref()).await;
    }

    /// The message loop. Returns `Some(reason)` for a fatal close,
    /// `None` when the peer went away on its own.
    async fn serve(&mut self) -> Option<String> {
        loop {
            let deadline = self.last_activity + self.config.keepalive;
            let tick = {
                let transport = &mut self.transport;
                let joined = self.joined.as_mut();
                tokio::select! {
                    inbound = transport.recv() => Tick::Inbound(inbound),
                    update = async {
                        match joined {
                            Some(topic) if !topic.ended => topic.updates.recv().await,
                            _ => std::future::pending().await,
                        }
                    } => Tick::Update(update),
                    () = tokio::time::sleep_until(deadline) => Tick::KeepaliveExpired,
                }
            };

            match tick {
                Tick::Inbound(Inbound::Frame(bytes)) => {
                    self.last_activity = Instant::now();
                    if let Err(reason) = self.handle_frame(&bytes).await {
                        return Some(reason);
                    }
                }
                Tick::Inbound(Inbound::Closed) => {
                    debug!(session = %self.id, "peer closed the transport");
                    return None;
                }
                Tick::Inbound(Inbound::Error(e)) => {
                    warn!(session = %self.id, error = %e, "transport error");
                    return Some("transport_error".to_string());
                }
                Tick::Update(Some(update)) => {
                    self.last_activity = Instant::now();
                    let frame = state_updated_frame(&update.state);
                    if let Err(reason) = self.send(frame).await {
                        return Some(reason);
                    }
                }
                Tick::Update(None) => {
                    // Key deleted under us; the subscription is gone.
                    if let Some(topic) = &mut self.joined {
                        debug!(session = %self.id, key = %topic.key, "update stream ended");
                        topic.ended = true;
                    }
                }
                Tick::KeepaliveExpired => {
                    info!(session = %self.id, "keepalive window expired");
                    return Some("keepalive_timeout".to_string());
                }
            }
        }
    }

    /// Handles one inbound frame. `Err` carries a fatal close reason.
    async fn handle_frame(&mut self, bytes: &[u8]) -> Result<(), String> {
        let frame = match ClientFrame::decode(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(session = %self.id, error = %e, "undecodable inbound frame");
                return Err("decode_error".to_string());
            }
        };

        match frame.event.as_str() {
            "join" => self.handle_join(frame).await,
            "leave" => self.handle_leave().await,
            event => match CommandKind::parse(event) {
                Some(kind) => self.handle_command(kind, frame).await,
                None => {
                    let err = ChannelError::UnknownCommand(event.to_string());
                    self.send(Reply::error(&err).to_bytes()).await
                }
            },
        }
    }

    async fn handle_join(&mut self, frame: ClientFrame) -> Result<(), String> {
        if self.joined.is_some() {
            let err = ChannelError::InvalidCommand("session already holds a join".into());
            return self.send(Reply::error(&err).to_bytes()).await;
        }

        let Some(topic) = frame.payload.get("topic").and_then(|t| t.as_str()) else {
            let err = ChannelError::MissingField("topic");
            return self.send(Reply::error(&err).to_bytes()).await;
        };
        let key = match parse_topic(topic) {
            Ok(key) => key,
            Err(err) => {
                // Foreign topic prefixes are terminal.
                self.send(Reply::error(&err).to_bytes()).await?;
                return Err(err.kind().to_string());
            }
        };

        // Subscribe before reading state: every transition after this
        // read reaches the peer as a broadcast, and the read itself is
        // serialized against concurrent mutations by the key lock.
        let (subscriber, updates) = Subscriber::new(self.config.subscriber_capacity);
        let subscriber_id = subscriber.id();
        self.registry.subscribe(&key, subscriber).await;

        // A key nobody has written yet presents as the empty replica
        // of the default kind, without binding the key to it: the
        // first command decides the real kind.
        let replica = match self.registry.get(&key).await {
            Some(replica) => replica,
            None => Replica::empty(self.config.default_kind),
        };

        info!(session = %self.id, node = %self.node, key = %key, "joined topic");
        self.joined = Some(JoinedTopic {
            key,
            subscriber_id,
            updates,
            ended: false,
        });

        let reply = Reply::ok(json!({
            "state": replica.encode(),
            "profile": self.profile.as_str(),
            "config": self.profile.config(),
        }));
        self.send(reply.to_bytes()).await
    }

    async fn handle_leave(&mut self) -> Result<(), String> {
        if let Some(topic) = self.joined.take() {
            self.registry
                .unsubscribe(&topic.key, topic.subscriber_id)
                .await;
            info!(session = %self.id, key = %topic.key, "left topic");
        }
        self.send(Reply::ok(json!({})).to_bytes()).await
    }

    async fn handle_command(
        &mut self,
        kind: CommandKind,
        frame: ClientFrame,
    ) -> Result<(), String> {
        let Some(topic) = &self.joined else {
            let err = ChannelError::InvalidCommand("no topic joined".into());
            return self.send(Reply::error(&err).to_bytes()).await;
        };
        let key = topic.key.clone();
        let origin = Some(topic.subscriber_id);

        let command = Command {
            kind,
            payload: frame.payload,
            request_id: frame.request_id,
        };
        match self.processor.execute(&key, origin, command).await {
            Ok(replica) => {
                let data = if kind == CommandKind::Sync {
                    json!({"delta": replica.encode()})
                } else {
                    json!({"state": replica.encode()})
                };
                self.send(Reply::ok(data).to_bytes()).await
            }
            Err(err) => {
                debug!(session = %self.id, key = %key, kind = err.kind(), "command failed");
                self.send(Reply::error(&err).to_bytes()).await?;
                if err.is_fatal() {
                    Err(err.kind().to_string())
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Sends one frame; backpressure and closed transports are fatal.
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), String> {
        match self.transport.send(frame).await {
            SendStatus::Sent => {
                self.last_activity = Instant::now();
                Ok(())
            }
            SendStatus::Backpressure => {
                warn!(session = %self.id, "peer exceeded backpressure threshold");
                Err("backpressure".to_string())
            }
            SendStatus::Closed => Err("transport_closed".to_string()),
        }
    }

    async fn cleanup(&mut self, reason: Option<&str>) {
        if let Some(topic) = self.joined.take() {
            self.registry
                .unsubscribe(&topic.key, topic.subscriber_id)
                .await;
        }
        self.policy.unregister(&self.node).await;
        self.transport.close(reason).await;
        info!(session = %self.id, node = %self.node, reason = reason.unwrap_or("peer_closed"),
            "session ended");
    }
}
