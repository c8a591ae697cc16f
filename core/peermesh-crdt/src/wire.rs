//! JSON wire codec for replicas.
//!
//! Envelope: `{"type": <kind>, "payload": {...}, "version": n}`.
//! Payload shapes per kind:
//!
//! - `g_counter`: `{"counts": {node: int}}`
//! - `pn_counter`: `{"positive": {node: int}, "negative": {node: int}}`
//! - `lww_register`: `{"value": any, "timestamp": int, "author": str}`
//! - `or_set`: `{"elements": {elem: [{"author": str, "seq": int}]}}`
//!
//! Decoding tolerates absent optional fields (`version`, `author`,
//! empty payload maps) and rejects unknown kinds with
//! [`CrdtError::UnknownKind`]. Round-trip preserves value equality.

use crate::{CrdtError, GCounter, LwwRegister, OrSet, PnCounter, Replica, ReplicaKind, State, Tag};
use peermesh_types::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    version: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct GCounterWire {
    #[serde(default)]
    counts: HashMap<NodeId, u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PnCounterWire {
    #[serde(default)]
    positive: HashMap<NodeId, u64>,
    #[serde(default)]
    negative: HashMap<NodeId, u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LwwRegisterWire {
    #[serde(default)]
    value: Value,
    #[serde(default)]
    timestamp: u64,
    #[serde(default = "NodeId::unset")]
    author: NodeId,
}

#[derive(Debug, Serialize, Deserialize)]
struct OrSetWire {
    #[serde(default)]
    elements: HashMap<String, Vec<Tag>>,
}

/// Encodes a replica into its JSON wire form.
#[must_use]
pub fn encode(replica: &Replica) -> Value {
    let payload = match replica.state() {
        State::GCounter(c) => to_value(GCounterWire {
            counts: c.counts().clone(),
        }),
        State::PnCounter(c) => to_value(PnCounterWire {
            positive: c.positive().counts().clone(),
            negative: c.negative().counts().clone(),
        }),
        State::LwwRegister(r) => to_value(LwwRegisterWire {
            value: r.value().clone(),
            timestamp: r.timestamp(),
            author: r.author().clone(),
        }),
        State::OrSet(s) => to_value(OrSetWire {
            elements: s
                .elements()
                .iter()
                .map(|(e, tags)| (e.clone(), tags.iter().cloned().collect()))
                .collect(),
        }),
    };
    serde_json::json!({
        "type": replica.kind().as_str(),
        "payload": payload,
        "version": replica.version(),
    })
}

// Wire DTOs contain only JSON-representable fields.
fn to_value<T: Serialize>(wire: T) -> Value {
    serde_json::to_value(wire).unwrap_or(Value::Null)
}

/// Decodes a replica from its JSON wire form.
pub fn decode(value: &Value) -> Result<Replica, CrdtError> {
    let envelope: Envelope = serde_json::from_value(value.clone())?;
    let kind = ReplicaKind::parse(&envelope.kind)?;
    let state = match kind {
        ReplicaKind::GCounter => {
            let wire: GCounterWire = serde_json::from_value(envelope.payload)?;
            State::GCounter(GCounter::from_counts(wire.counts))
        }
        ReplicaKind::PnCounter => {
            let wire: PnCounterWire = serde_json::from_value(envelope.payload)?;
            State::PnCounter(PnCounter::from_parts(
                GCounter::from_counts(wire.positive),
                GCounter::from_counts(wire.negative),
            ))
        }
        ReplicaKind::LwwRegister => {
            let wire: LwwRegisterWire = serde_json::from_value(envelope.payload)?;
            State::LwwRegister(LwwRegister::from_parts(
                wire.value,
                wire.timestamp,
                wire.author,
            ))
        }
        ReplicaKind::OrSet => {
            let wire: OrSetWire = serde_json::from_value(envelope.payload)?;
            State::OrSet(OrSet::from_elements(
                wire.elements
                    .into_iter()
                    .map(|(e, tags)| (e, tags.into_iter().collect()))
                    .collect(),
            ))
        }
    };
    Ok(Replica::from_state(state, envelope.version))
}
