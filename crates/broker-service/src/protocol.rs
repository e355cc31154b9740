//! Wire protocol between participants and the broker.
//!
//! Every WebSocket text frame is a JSON object `{"event": "<name>", "data": <payload>}`.
//! `data` is omitted for events without payload.
//!
//! Inbound frames are decoded by hand rather than through a tagged serde enum so
//! that missing or odd payloads can be defaulted (`search` without preferences)
//! or rejected as malformed without aborting the connection.

use crate::errors::BrokerError;
use chrono::{DateTime, Utc};
use common::types::{PairingId, ParticipantId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fixed quality score assigned to every pairing.
pub const DEFAULT_PAIRING_QUALITY: u32 = 1;

/// Opaque search preferences supplied by a participant.
///
/// Passed through untouched; the broker does not interpret them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preferences(pub Value);

impl Default for Preferences {
    fn default() -> Self {
        Self(Value::Object(Map::new()))
    }
}

impl Preferences {
    fn from_data(data: Value) -> Self {
        match data {
            Value::Null => Self::default(),
            other => Self(other),
        }
    }
}

/// WebRTC handshake message kinds carried by the signaling relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    /// Event name on the wire.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
        }
    }

    /// Mandatory payload field carrying the handshake body.
    #[must_use]
    pub const fn body_field(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "candidate",
        }
    }

    fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "offer" => Some(SignalKind::Offer),
            "answer" => Some(SignalKind::Answer),
            "ice-candidate" => Some(SignalKind::IceCandidate),
            _ => None,
        }
    }
}

/// Events sent by a participant to the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Start (or restart) searching for a peer.
    Search { preferences: Preferences },
    /// Stop searching or end the current session.
    Cancel,
    /// End the current session and search again.
    Skip,
    /// End the current session, block the peer and search again.
    ///
    /// The reported id is informational; the broker always reports the
    /// participant's current peer.
    Report { target: Option<ParticipantId> },
    /// Forwarded to the peer unchanged.
    Like,
    /// Forwarded to the peer unchanged.
    Emoji { emoji: Value },
    /// Never be paired with `target` again.
    Block { target: ParticipantId },
    /// Offer / answer / ICE candidate for the signaling relay.
    ///
    /// The payload is validated by the relay, not here.
    Signal { kind: SignalKind, payload: Value },
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

impl ClientEvent {
    /// Decode an inbound text frame.
    pub fn decode(text: &str) -> Result<Self, BrokerError> {
        let frame: RawFrame = serde_json::from_str(text)
            .map_err(|e| BrokerError::Malformed(format!("invalid frame: {e}")))?;

        let event = match frame.event.as_str() {
            "search" => ClientEvent::Search {
                preferences: Preferences::from_data(frame.data),
            },
            "cancel" => ClientEvent::Cancel,
            "skip" => ClientEvent::Skip,
            "report" => ClientEvent::Report {
                target: parse_target(&frame.data).ok(),
            },
            "like" => ClientEvent::Like,
            "emoji" => ClientEvent::Emoji { emoji: frame.data },
            "block" => ClientEvent::Block {
                target: parse_target(&frame.data)?,
            },
            name => match SignalKind::from_event_name(name) {
                Some(kind) => ClientEvent::Signal {
                    kind,
                    payload: frame.data,
                },
                None => {
                    return Err(BrokerError::Malformed(format!("unknown event: {name}")));
                }
            },
        };

        Ok(event)
    }

    /// Encode as a text frame (used by clients and tests).
    #[must_use]
    pub fn encode(&self) -> String {
        let data = match self {
            ClientEvent::Search { preferences } => Some(preferences.0.clone()),
            ClientEvent::Report { target } => {
                target.map(|t| serde_json::json!({ "target": t.to_string() }))
            }
            ClientEvent::Emoji { emoji } => Some(emoji.clone()),
            ClientEvent::Block { target } => Some(serde_json::json!({ "target": target.to_string() })),
            ClientEvent::Signal { payload, .. } => Some(payload.clone()),
            ClientEvent::Cancel | ClientEvent::Skip | ClientEvent::Like => None,
        };

        let mut frame = Map::new();
        frame.insert("event".to_string(), Value::from(self.name()));
        if let Some(data) = data {
            frame.insert("data".to_string(), data);
        }
        Value::Object(frame).to_string()
    }

    /// Event name, bounded for log fields and metric labels.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Search { .. } => "search",
            ClientEvent::Cancel => "cancel",
            ClientEvent::Skip => "skip",
            ClientEvent::Report { .. } => "report",
            ClientEvent::Like => "like",
            ClientEvent::Emoji { .. } => "emoji",
            ClientEvent::Block { .. } => "block",
            ClientEvent::Signal { kind, .. } => kind.event_name(),
        }
    }
}

/// Accepts either a bare id string or `{"target": "<id>"}`.
fn parse_target(data: &Value) -> Result<ParticipantId, BrokerError> {
    let raw = match data {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("target").and_then(Value::as_str),
        _ => None,
    };

    raw.ok_or_else(|| BrokerError::Malformed("missing target".to_string()))?
        .parse()
        .map_err(|_| BrokerError::Malformed("target is not a participant id".to_string()))
}

/// Payload of the `found` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingFound {
    pub peer_id: ParticipantId,
    pub pairing_id: PairingId,
    pub quality: u32,
    pub start_time: DateTime<Utc>,
}

/// Events sent by the broker to a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// First frame on every connection: the participant's own id.
    #[serde(rename = "connected")]
    Connected {
        #[serde(rename = "participantId")]
        participant_id: ParticipantId,
    },
    /// A pairing was created.
    #[serde(rename = "found")]
    Found(PairingFound),
    /// The peer cancelled or disconnected.
    #[serde(rename = "cancelled")]
    Cancelled,
    /// The peer skipped.
    #[serde(rename = "skipped")]
    Skipped,
    /// The peer reported this participant.
    #[serde(rename = "reported")]
    Reported,
    /// Waiting queue length.
    #[serde(rename = "queue:count")]
    QueueCount(usize),
    #[serde(rename = "like")]
    Like,
    #[serde(rename = "emoji")]
    Emoji(Value),
    #[serde(rename = "offer")]
    Offer(Value),
    #[serde(rename = "answer")]
    Answer(Value),
    #[serde(rename = "ice-candidate")]
    IceCandidate(Value),
}

impl ServerEvent {
    /// Build the outbound event for a relayed handshake message.
    #[must_use]
    pub fn signal(kind: SignalKind, body: Value) -> Self {
        match kind {
            SignalKind::Offer => ServerEvent::Offer(body),
            SignalKind::Answer => ServerEvent::Answer(body),
            SignalKind::IceCandidate => ServerEvent::IceCandidate(body),
        }
    }

    /// Encode as a text frame.
    pub fn encode(&self) -> Result<String, BrokerError> {
        serde_json::to_string(self).map_err(|e| BrokerError::Internal(format!("encode failed: {e}")))
    }

    /// Decode a text frame (used by clients and tests).
    pub fn decode(text: &str) -> Result<Self, BrokerError> {
        serde_json::from_str(text).map_err(|e| BrokerError::Malformed(e.to_string()))
    }

    /// Event name, bounded for log fields.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::Found(_) => "found",
            ServerEvent::Cancelled => "cancelled",
            ServerEvent::Skipped => "skipped",
            ServerEvent::Reported => "reported",
            ServerEvent::QueueCount(_) => "queue:count",
            ServerEvent::Like => "like",
            ServerEvent::Emoji(_) => "emoji",
            ServerEvent::Offer(_) => "offer",
            ServerEvent::Answer(_) => "answer",
            ServerEvent::IceCandidate(_) => "ice-candidate",
        }
    }
}
