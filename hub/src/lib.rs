//! HTTP/WebSocket surface of the peermesh hub.
//!
//! Two routes: `/api/v1/info` describes the deployment, `/ws` upgrades
//! a peer connection. Connect parameters travel in the upgrade query
//! string (`node_id`, plus `capabilities` as URL-encoded JSON); a
//! missing node id rejects the connection with 401 before any upgrade
//! happens.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use peermesh_channel::transport::{Inbound, SendStatus, Transport};
use peermesh_channel::{CapabilityReport, ConnectParams, PolicyTable, Session, SessionConfig};
use peermesh_registry::Registry;
use peermesh_types::SeqGen;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Deployment description served at `/api/v1/info`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ServerInfo {
    pub server: String,
    pub version: String,
    pub default_kind: String,
}

/// Shared state handed to every connection.
pub struct HubState {
    pub registry: Arc<Registry>,
    pub policy: Arc<PolicyTable>,
    pub seq: Arc<SeqGen>,
    pub session_config: SessionConfig,
    pub info: ServerInfo,
}

impl HubState {
    /// Creates hub state with fresh long-lived services.
    #[must_use]
    pub fn new(session_config: SessionConfig) -> Self {
        let info = ServerInfo {
            server: "peermesh-hub".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            default_kind: session_config.default_kind.as_str().to_string(),
        };
        Self {
            registry: Arc::new(Registry::new()),
            policy: Arc::new(PolicyTable::new()),
            seq: Arc::new(SeqGen::new()),
            session_config,
            info,
        }
    }
}

/// Builds the hub router.
pub fn build_router(state: Arc<HubState>) -> Router {
    Router::new()
        .route("/api/v1/info", get(info_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn info_handler(State(state): State<Arc<HubState>>) -> Json<ServerInfo> {
    Json(state.info.clone())
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    node_id: Option<String>,
    capabilities: Option<String>,
}

async fn ws_handler(
    State(state): State<Arc<HubState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    // Reject before upgrading: a connection without identity never
    // reaches the session layer.
    let Some(node_id) = query.node_id.filter(|id| !id.is_empty()) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let capabilities: Option<CapabilityReport> = query
        .capabilities
        .as_deref()
        .and_then(|raw| match serde_json::from_str(raw) {
            Ok(report) => Some(report),
            Err(e) => {
                debug!(node = %node_id, error = %e, "unreadable capability report, using defaults");
                None
            }
        });

    ws.on_upgrade(move |socket| async move {
        let params = ConnectParams {
            node_id: Some(node_id),
            capabilities,
        };
        match Session::connect(
            WsTransport::new(socket),
            state.registry.clone(),
            state.policy.clone(),
            state.seq.clone(),
            state.session_config.clone(),
            params,
        )
        .await
        {
            Ok(session) => session.run().await,
            Err(e) => warn!(error = %e, "connection rejected"),
        }
    })
}

/// [`Transport`] over an accepted WebSocket.
///
/// Frames are JSON text messages. Sending awaits the socket, which is
/// where WebSocket backpressure lives; the bounded subscriber buffer
/// upstream keeps a stalled peer from pinning the registry.
pub struct WsTransport {
    socket: WebSocket,
    closed: bool,
}

impl WsTransport {
    /// Wraps an accepted socket.
    #[must_use]
    pub fn new(socket: WebSocket) -> Self {
        Self {
            socket,
            closed: false,
        }
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: Vec<u8>) -> SendStatus {
        if self.closed {
            return SendStatus::Closed;
        }
        let message = match String::from_utf8(frame) {
            Ok(text) => Message::Text(text.into()),
            Err(e) => Message::Binary(e.into_bytes().into()),
        };
        match self.socket.send(message).await {
            Ok(()) => SendStatus::Sent,
            Err(_) => SendStatus::Closed,
        }
    }

    async fn recv(&mut self) -> Inbound {
        if self.closed {
            return Inbound::Closed;
        }
        loop {
            match self.socket.recv().await {
                Some(Ok(Message::Text(text))) => return Inbound::Frame(text.as_bytes().to_vec()),
                Some(Ok(Message::Binary(bytes))) => return Inbound::Frame(bytes.to_vec()),
                // The library answers pings itself; nothing to do.
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Inbound::Closed,
                Some(Err(e)) => return Inbound::Error(e.to_string()),
            }
        }
    }

    async fn close(&mut self, reason: Option<&str>) {
        if self.closed {
            return;
        }
        self.closed = true;
        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: reason.unwrap_or("").to_string().into(),
        };
        let _ = self.socket.send(Message::Close(Some(frame))).await;
    }
}
