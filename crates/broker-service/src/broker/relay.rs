//! Signaling relay and peer forwarding.
//!
//! The relay is permissive: it does not check that sender and recipient are
//! paired, only that the message is well formed and the recipient is connected.

use super::Broker;
use crate::observability::metrics;
use crate::protocol::{ServerEvent, SignalKind};
use common::types::ParticipantId;
use serde_json::Value;
use tracing::debug;

impl Broker {
    /// Forward an offer, answer or ICE candidate to the participant named in
    /// the payload's `to` field.
    ///
    /// The recipient gets the same body with `to` removed and `from` set to
    /// the sender. Malformed payloads are dropped. Returns whether the
    /// message was delivered.
    pub fn relay(&mut self, from: ParticipantId, kind: SignalKind, payload: Value) -> bool {
        let Value::Object(mut body) = payload else {
            return drop_signal(from, kind, "payload is not an object");
        };

        if body.get(kind.body_field()).map_or(true, Value::is_null) {
            return drop_signal(from, kind, "missing handshake body");
        }

        let Some(to) = body
            .remove("to")
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<ParticipantId>().ok())
        else {
            return drop_signal(from, kind, "missing or invalid recipient");
        };

        body.insert("from".to_string(), Value::String(from.to_string()));

        let delivered = self
            .connections
            .send(to, ServerEvent::signal(kind, Value::Object(body)));
        if delivered {
            metrics::record_signaling_relayed(kind.event_name());
        }
        delivered
    }

    /// Forward a `like` or `emoji` to the current peer. No-op when unpaired.
    pub fn forward_to_peer(&mut self, from: ParticipantId, event: ServerEvent) -> bool {
        let Some(peer_id) = self.pairings.peer_of(from) else {
            debug!(
                target: "broker.core",
                participant_id = %from,
                event = event.name(),
                "Nothing to forward to, participant is not paired"
            );
            return false;
        };
        self.connections.send(peer_id, event)
    }
}

fn drop_signal(from: ParticipantId, kind: SignalKind, reason: &str) -> bool {
    debug!(
        target: "broker.core",
        participant_id = %from,
        kind = kind.event_name(),
        reason,
        "Dropping malformed signaling message"
    );
    metrics::record_event_dropped("invalid_signal");
    false
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::broker::testing::TestSink;
    use crate::broker::EventSink;
    use crate::protocol::Preferences;
    use serde_json::json;
    use std::sync::Arc;

    fn connected(broker: &mut Broker) -> (ParticipantId, Arc<TestSink>) {
        let sink = TestSink::new();
        broker.connect(sink.clone());
        sink.take();
        (sink.participant_id(), sink)
    }

    #[test]
    fn test_offer_is_forwarded_with_sender() {
        let mut broker = Broker::new();
        let (a, _) = connected(&mut broker);
        let (b, sb) = connected(&mut broker);

        let delivered = broker.relay(
            a,
            SignalKind::Offer,
            json!({"to": b.to_string(), "offer": {"type": "offer", "sdp": "v=0"}}),
        );

        assert!(delivered);
        assert_eq!(
            sb.events(),
            vec![ServerEvent::Offer(json!({
                "from": a.to_string(),
                "offer": {"type": "offer", "sdp": "v=0"}
            }))]
        );
    }

    #[test]
    fn test_ice_candidate_requires_candidate_field() {
        let mut broker = Broker::new();
        let (a, _) = connected(&mut broker);
        let (b, sb) = connected(&mut broker);

        assert!(!broker.relay(
            a,
            SignalKind::IceCandidate,
            json!({"to": b.to_string(), "offer": {}})
        ));
        assert!(!broker.relay(
            a,
            SignalKind::IceCandidate,
            json!({"to": b.to_string(), "candidate": null})
        ));
        assert!(broker.relay(
            a,
            SignalKind::IceCandidate,
            json!({"to": b.to_string(), "candidate": {"candidate": "candidate:1"}})
        ));
        assert_eq!(sb.events().len(), 1);
    }

    #[test]
    fn test_missing_or_unknown_recipient_is_dropped() {
        let mut broker = Broker::new();
        let (a, _) = connected(&mut broker);

        assert!(!broker.relay(a, SignalKind::Answer, json!({"answer": {}})));
        assert!(!broker.relay(
            a,
            SignalKind::Answer,
            json!({"to": "not-an-id", "answer": {}})
        ));
        assert!(!broker.relay(
            a,
            SignalKind::Answer,
            json!({"to": ParticipantId::new().to_string(), "answer": {}})
        ));
        assert!(!broker.relay(a, SignalKind::Answer, json!("answer")));
    }

    #[test]
    fn test_relay_does_not_require_pairing() {
        let mut broker = Broker::new();
        let (a, _) = connected(&mut broker);
        let (b, sb) = connected(&mut broker);

        assert!(broker.pairing_of(a).is_none());
        assert!(broker.relay(
            a,
            SignalKind::Answer,
            json!({"to": b.to_string(), "answer": {"sdp": "v=0"}})
        ));
        assert_eq!(sb.events().len(), 1);
    }

    #[test]
    fn test_like_and_emoji_reach_peer_only_when_paired() {
        let mut broker = Broker::new();
        let (a, sa) = connected(&mut broker);
        let (b, sb) = connected(&mut broker);

        assert!(!broker.forward_to_peer(a, ServerEvent::Like));

        broker.search(a, Preferences::default());
        broker.search(b, Preferences::default());
        sa.take();
        sb.take();

        assert!(broker.forward_to_peer(a, ServerEvent::Like));
        assert!(broker.forward_to_peer(b, ServerEvent::Emoji(json!("🎉"))));

        assert_eq!(sb.events(), vec![ServerEvent::Like]);
        assert_eq!(sa.events(), vec![ServerEvent::Emoji(json!("🎉"))]);
    }
}
