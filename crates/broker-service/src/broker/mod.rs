//! Pairing broker core.
//!
//! All broker state lives in one [`Broker`] value owned by a single task
//! (the `BrokerActor`). Every operation runs to completion before the next
//! one starts, so the waiting queue, pairing table and block registry need no
//! locks and their cross-structure invariants are never observed torn:
//!
//! - a participant is never both queued and paired
//! - a pairing is indexed under both of its participants or under neither
//! - blocked participants are never paired, whichever side blocked
//!
//! Operations never fail. Stale ids and unmet preconditions are no-ops.
//!
//! # Components
//!
//! - [`ConnectionRegistry`] - participant id to [`EventSink`]
//! - [`BlockRegistry`] - who refuses to meet whom
//! - [`WaitingQueue`] - participants searching, in arrival order
//! - [`PairingTable`] - live pairings
//! - matching, lifecycle and relay - `impl Broker` blocks in their own files

mod blocks;
mod lifecycle;
mod matching;
mod pairing;
mod queue;
mod registry;
mod relay;

#[cfg(test)]
pub(crate) mod testing;

pub use blocks::BlockRegistry;
pub use pairing::{Pairing, PairingTable};
pub use queue::{QueueEntry, WaitingQueue};
pub use registry::{ConnectionRegistry, EventSink};

use crate::observability::metrics;
use crate::protocol::{ClientEvent, ServerEvent};
use common::types::ParticipantId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Per-participant lifecycle state.
///
/// `Idle -> Searching -> Paired -> Idle`, with skip/report moving a paired
/// participant straight back to `Searching`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantState {
    Idle,
    Searching,
    Paired,
}

/// Why a pairing ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Cancel,
    Disconnect,
    Skip,
    Report,
    /// A paired participant searched again.
    Research,
}

impl EndReason {
    /// Bounded label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EndReason::Cancel => "cancel",
            EndReason::Disconnect => "disconnect",
            EndReason::Skip => "skip",
            EndReason::Report => "report",
            EndReason::Research => "research",
        }
    }
}

/// Point-in-time broker counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerStatus {
    pub connections: usize,
    pub queue_depth: usize,
    pub pairings_active: usize,
    pub block_relations: usize,
}

/// The matchmaking and session broker.
#[derive(Debug, Default)]
pub struct Broker {
    connections: ConnectionRegistry,
    blocks: BlockRegistry,
    queue: WaitingQueue,
    pairings: PairingTable,
    /// Queue length most recently broadcast. Newcomers are sent the current
    /// length directly, so the initial empty queue needs no broadcast.
    last_broadcast_len: usize,
}

impl Broker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection.
    ///
    /// The newcomer learns its own id and the current queue length.
    pub fn connect(&mut self, sink: Arc<dyn EventSink>) {
        let id = sink.participant_id();
        if self.connections.insert(sink).is_some() {
            debug!(target: "broker.core", participant_id = %id, "Connection replaced existing sink");
        }

        self.connections
            .send(id, ServerEvent::Connected { participant_id: id });
        self.connections
            .send(id, ServerEvent::QueueCount(self.queue.len()));

        debug!(
            target: "broker.core",
            participant_id = %id,
            connections = self.connections.len(),
            "Participant connected"
        );
        self.finish_event();
    }

    /// Tear down a participant whose transport is gone, then forget it.
    ///
    /// Idempotent: disconnecting an idle or unknown id only clears what exists.
    pub fn disconnect(&mut self, id: ParticipantId) {
        self.teardown(id, EndReason::Disconnect);
        self.connections.remove(id);

        debug!(
            target: "broker.core",
            participant_id = %id,
            connections = self.connections.len(),
            "Participant disconnected"
        );
        self.finish_event();
    }

    /// Apply one inbound event from a connected participant.
    pub fn handle(&mut self, id: ParticipantId, event: ClientEvent) {
        if !self.connections.contains(id) {
            debug!(
                target: "broker.core",
                participant_id = %id,
                event = event.name(),
                "Ignoring event from unknown participant"
            );
            metrics::record_event_dropped("stale_target");
            return;
        }

        match event {
            ClientEvent::Search { preferences } => {
                self.search(id, preferences);
            }
            ClientEvent::Cancel => self.cancel(id),
            ClientEvent::Skip => self.skip(id),
            ClientEvent::Report { target } => self.report(id, target),
            ClientEvent::Block { target } => self.block(id, target),
            ClientEvent::Like => {
                self.forward_to_peer(id, ServerEvent::Like);
            }
            ClientEvent::Emoji { emoji } => {
                self.forward_to_peer(id, ServerEvent::Emoji(emoji));
            }
            ClientEvent::Signal { kind, payload } => {
                self.relay(id, kind, payload);
            }
        }
    }

    /// Record that `observer` never wants to meet `target`.
    ///
    /// An existing pairing between them is left alone.
    pub fn block(&mut self, observer: ParticipantId, target: ParticipantId) {
        if self.blocks.add_block(observer, target) {
            info!(
                target: "broker.core",
                participant_id = %observer,
                blocked = %target,
                "Participant blocked peer"
            );
        }
    }

    /// Current lifecycle state of a participant. Unknown ids are `Idle`.
    #[must_use]
    pub fn participant_state(&self, id: ParticipantId) -> ParticipantState {
        if self.pairings.is_paired(id) {
            ParticipantState::Paired
        } else if self.queue.contains(id) {
            ParticipantState::Searching
        } else {
            ParticipantState::Idle
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> BrokerStatus {
        BrokerStatus {
            connections: self.connections.len(),
            queue_depth: self.queue.len(),
            pairings_active: self.pairings.len(),
            block_relations: self.blocks.len(),
        }
    }

    #[must_use]
    pub fn is_connected(&self, id: ParticipantId) -> bool {
        self.connections.contains(id)
    }

    /// Queued participant ids in arrival order.
    #[must_use]
    pub fn queued(&self) -> Vec<ParticipantId> {
        self.queue.ids()
    }

    #[must_use]
    pub fn pairing_of(&self, id: ParticipantId) -> Option<&Pairing> {
        self.pairings.get(id)
    }

    #[must_use]
    pub fn is_blocked(&self, a: ParticipantId, b: ParticipantId) -> bool {
        self.blocks.is_blocked(a, b)
    }

    /// Describe every broken cross-structure invariant. Empty when healthy.
    #[must_use]
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        for id in self.pairings.participants() {
            match self.pairings.get(id) {
                None => violations.push(format!("{id} has a dangling pairing index entry")),
                Some(pairing) => {
                    let peer = pairing.peer_of(id);
                    if peer.and_then(|p| self.pairings.peer_of(p)) != Some(id) {
                        violations.push(format!("{id} is paired with {peer:?} but not reciprocally"));
                    }
                    if pairing.participant_a == pairing.participant_b {
                        violations.push(format!("{id} is paired with itself"));
                    }
                }
            }
            if self.queue.contains(id) {
                violations.push(format!("{id} is both queued and paired"));
            }
        }

        let queued = self.queue.ids();
        for (index, id) in queued.iter().enumerate() {
            if queued.iter().skip(index + 1).any(|other| other == id) {
                violations.push(format!("{id} is queued more than once"));
            }
            if !self.connections.contains(*id) {
                violations.push(format!("{id} is queued without a connection"));
            }
        }

        violations
    }

    /// End-of-event bookkeeping: coalesced queue length broadcast and gauges.
    fn finish_event(&mut self) {
        let len = self.queue.len();
        if self.last_broadcast_len != len {
            self.connections.broadcast(&ServerEvent::QueueCount(len));
            self.last_broadcast_len = len;
        }

        metrics::set_connections_active(self.connections.len());
        metrics::set_queue_depth(len);
        metrics::set_pairings_active(self.pairings.len());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::testing::TestSink;
    use super::*;
    use crate::protocol::{Preferences, SignalKind};
    use serde_json::json;

    fn connect(broker: &mut Broker) -> (ParticipantId, Arc<TestSink>) {
        let sink = TestSink::new();
        broker.connect(sink.clone());
        (sink.participant_id(), sink)
    }

    #[test]
    fn test_connect_sends_id_and_queue_length() {
        let mut broker = Broker::new();
        let (p1, _) = connect(&mut broker);
        broker.search(p1, Preferences::default());

        let (p2, s2) = connect(&mut broker);

        assert_eq!(
            s2.events(),
            vec![
                ServerEvent::Connected { participant_id: p2 },
                ServerEvent::QueueCount(1),
            ]
        );
        assert_eq!(broker.participant_state(p2), ParticipantState::Idle);
    }

    #[test]
    fn test_handle_dispatches_client_events() {
        let mut broker = Broker::new();
        let (p1, s1) = connect(&mut broker);
        let (p2, s2) = connect(&mut broker);

        broker.handle(p1, ClientEvent::Search { preferences: Preferences::default() });
        broker.handle(p2, ClientEvent::Search { preferences: Preferences(json!({"region": "eu"})) });
        assert_eq!(broker.participant_state(p1), ParticipantState::Paired);

        broker.handle(p1, ClientEvent::Like);
        broker.handle(
            p1,
            ClientEvent::Signal {
                kind: SignalKind::Offer,
                payload: json!({"to": p2.to_string(), "offer": {"sdp": "v=0"}}),
            },
        );
        broker.handle(p2, ClientEvent::Skip);

        let to_p2 = s2.notifications();
        assert!(to_p2.contains(&ServerEvent::Like));
        assert!(to_p2.iter().any(|e| matches!(e, ServerEvent::Offer(_))));
        assert_eq!(s1.notifications().last(), Some(&ServerEvent::Skipped));
        assert_eq!(broker.queued(), vec![p2, p1]);

        broker.handle(p1, ClientEvent::Block { target: p2 });
        broker.handle(p1, ClientEvent::Cancel);
        assert!(broker.is_blocked(p1, p2));
        assert_eq!(broker.queued(), vec![p2]);
    }

    #[test]
    fn test_handle_ignores_unknown_participant() {
        let mut broker = Broker::new();
        broker.handle(
            ParticipantId::new(),
            ClientEvent::Search { preferences: Preferences::default() },
        );
        assert_eq!(broker.snapshot().queue_depth, 0);
    }

    #[test]
    fn test_queue_count_broadcast_is_coalesced() {
        let mut broker = Broker::new();
        let (p1, s1) = connect(&mut broker);
        let (p2, _) = connect(&mut broker);
        s1.take();

        // Appending p2 then pairing it within one event nets out to a single
        // broadcast of the final length.
        broker.search(p1, Preferences::default());
        broker.search(p2, Preferences::default());
        broker.cancel(p1);

        assert_eq!(s1.queue_counts(), vec![1, 0, 1]);
    }

    #[test]
    fn test_snapshot_counts() {
        let mut broker = Broker::new();
        let (p1, _) = connect(&mut broker);
        let (p2, _) = connect(&mut broker);
        let (p3, _) = connect(&mut broker);

        broker.search(p1, Preferences::default());
        broker.search(p2, Preferences::default());
        broker.search(p3, Preferences::default());
        broker.block(p3, p1);

        assert_eq!(
            broker.snapshot(),
            BrokerStatus {
                connections: 3,
                queue_depth: 1,
                pairings_active: 1,
                block_relations: 1,
            }
        );
    }

    #[test]
    fn test_invariants_hold_under_mixed_event_sequences() {
        // Deterministic pseudo-random walk over every lifecycle operation.
        let mut broker = Broker::new();
        let mut ids: Vec<ParticipantId> = Vec::new();
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        for _ in 0..8 {
            ids.push(connect(&mut broker).0);
        }

        for _ in 0..2_000 {
            let pick = usize::try_from(next() % 8).unwrap();
            let other = usize::try_from(next() % 8).unwrap();
            let (id, target) = (*ids.get(pick).unwrap(), *ids.get(other).unwrap());

            match next() % 8 {
                0 | 1 | 2 => {
                    broker.search(id, Preferences::default());
                }
                3 => broker.cancel(id),
                4 => broker.skip(id),
                5 => broker.report(id, None),
                6 => broker.block(id, target),
                _ => {
                    broker.disconnect(id);
                    let replacement = connect(&mut broker).0;
                    *ids.get_mut(pick).unwrap() = replacement;
                }
            }

            let violations = broker.invariant_violations();
            assert!(violations.is_empty(), "{violations:?}");
            for pairing in ids.iter().filter_map(|id| broker.pairing_of(*id)) {
                assert_ne!(pairing.participant_a, pairing.participant_b);
            }
        }
    }
}
