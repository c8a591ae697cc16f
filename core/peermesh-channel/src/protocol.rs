//! Transport envelope types.
//!
//! Frames are UTF-8 JSON. Inbound: `{event, payload, request_id?}`.
//! Outbound replies: `{status, data?, error?}`. Broadcasts:
//! `{event: "state_updated", payload: {state}}`.

use crate::ChannelError;
use peermesh_types::Key;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Topic prefix for replica subscriptions.
pub const TOPIC_PREFIX: &str = "crdt:";

/// Parses a join topic of the form `"crdt:" + key`.
///
/// Any other prefix, an empty key, or a key with embedded NULs is
/// rejected with `unauthorized`.
pub fn parse_topic(topic: &str) -> Result<Key, ChannelError> {
    let key = topic
        .strip_prefix(TOPIC_PREFIX)
        .ok_or_else(|| ChannelError::Unauthorized(format!("topic `{topic}` is not joinable")))?;
    Key::new(key).map_err(|_| ChannelError::Unauthorized(format!("topic `{topic}` is not joinable")))
}

/// An inbound peer frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientFrame {
    /// The verb: `join`, `leave`, `sync`, or a command name.
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ClientFrame {
    /// Decodes a raw frame. Failure here is fatal to the session.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// The error half of an error reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// An outbound reply to one inbound frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Reply {
    /// A successful reply carrying `data`.
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
        }
    }

    /// An error reply for a recoverable failure.
    #[must_use]
    pub fn error(err: &ChannelError) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(ErrorBody {
                kind: err.kind().to_string(),
                message: err.to_string(),
            }),
        }
    }

    /// Serializes to frame bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|_| b"{\"status\":\"error\"}".to_vec())
    }
}

/// Builds a `state_updated` broadcast frame.
#[must_use]
pub fn state_updated_frame(state: &Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event": "state_updated",
        "payload": {"state": state},
    }))
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_topic_accepts_crdt_prefix() {
        let key = parse_topic("crdt:counter:1").unwrap();
        assert_eq!(key.as_str(), "counter:1");
    }

    #[test]
    fn parse_topic_rejects_other_prefixes() {
        for topic in ["room:lobby", "crdt", "counter:1", ""] {
            let err = parse_topic(topic).unwrap_err();
            assert_eq!(err.kind(), "unauthorized");
        }
    }

    #[test]
    fn parse_topic_rejects_empty_key() {
        assert_eq!(parse_topic("crdt:").unwrap_err().kind(), "unauthorized");
    }

    #[test]
    fn client_frame_decodes_without_request_id() {
        let frame = ClientFrame::decode(br#"{"event": "increment", "payload": {}}"#).unwrap();
        assert_eq!(frame.event, "increment");
        assert!(frame.request_id.is_none());
    }

    #[test]
    fn client_frame_rejects_garbage() {
        assert!(ClientFrame::decode(b"not json").is_err());
    }

    #[test]
    fn ok_reply_shape() {
        let reply = Reply::ok(json!({"state": null}));
        let wire: Value = serde_json::from_slice(&reply.to_bytes()).unwrap();
        assert_eq!(wire["status"], "ok");
        assert!(wire["data"].is_object());
        assert!(wire.get("error").is_none());
    }

    #[test]
    fn error_reply_carries_stable_kind() {
        let reply = Reply::error(&ChannelError::Duplicate("r7".into()));
        let wire: Value = serde_json::from_slice(&reply.to_bytes()).unwrap();
        assert_eq!(wire["status"], "error");
        assert_eq!(wire["error"]["kind"], "duplicate");
        assert!(wire.get("data").is_none());
    }

    #[test]
    fn state_updated_frame_shape() {
        let frame = state_updated_frame(&json!({"type": "g_counter"}));
        let wire: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(wire["event"], "state_updated");
        assert_eq!(wire["payload"]["state"]["type"], "g_counter");
    }
}
