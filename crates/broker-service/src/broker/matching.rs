//! Matching engine.
//!
//! First compatible waiter in arrival order wins. No scoring, no backtracking.

use super::{Broker, EndReason, Pairing, QueueEntry};
use crate::observability::metrics;
use crate::protocol::{PairingFound, Preferences, ServerEvent};
use common::types::ParticipantId;
use tracing::{debug, info};

impl Broker {
    /// Queue `id` and try to pair it with the earliest compatible waiter.
    ///
    /// Searching while paired ends the current pairing first (the peer is
    /// told `cancelled` and re-queued). Returns the new pairing, if any.
    pub fn search(&mut self, id: ParticipantId, preferences: Preferences) -> Option<Pairing> {
        if !self.connections.contains(id) {
            debug!(target: "broker.core", participant_id = %id, "Search from unknown participant");
            return None;
        }

        if self.pairings.is_paired(id) {
            self.teardown(id, EndReason::Research);
        }
        self.queue.remove(id);
        self.queue.push_back(QueueEntry::new(id, preferences));

        let pairing = self.try_match(id);
        self.finish_event();
        pairing
    }

    /// Scan the queue for a partner for the already-queued `id`.
    fn try_match(&mut self, id: ParticipantId) -> Option<Pairing> {
        let candidate = self
            .queue
            .iter()
            .find(|other| {
                other.id != id
                    && !self.pairings.is_paired(other.id)
                    && self.connections.contains(other.id)
                    && !self.blocks.is_blocked(id, other.id)
            })
            .map(|other| other.id);

        let Some(peer_id) = candidate else {
            debug!(
                target: "broker.core",
                participant_id = %id,
                queue_depth = self.queue.len(),
                "No compatible peer, waiting"
            );
            return None;
        };

        let own = self.queue.remove(id).map(|entry| entry.preferences);
        let peer = self.queue.remove(peer_id);
        let waited = peer.as_ref().map(|entry| entry.enqueued_at.elapsed());

        let pairing = Pairing::new(id, peer_id).with_preferences(
            own.unwrap_or_default(),
            peer.map(|entry| entry.preferences).unwrap_or_default(),
        );
        if !self.pairings.insert(pairing.clone()) {
            // Unreachable while the scan filters paired candidates.
            debug!(target: "broker.core", participant_id = %id, peer_id = %peer_id, "Pairing refused");
            return None;
        }

        if let Some(waited) = waited {
            metrics::record_pairing_created(waited);
        }
        info!(
            target: "broker.core",
            pairing_id = %pairing.id,
            participant_id = %id,
            peer_id = %peer_id,
            "Pairing created"
        );

        for (recipient, peer) in [(id, peer_id), (peer_id, id)] {
            self.connections.send(
                recipient,
                ServerEvent::Found(PairingFound {
                    peer_id: peer,
                    pairing_id: pairing.id.clone(),
                    quality: pairing.quality,
                    start_time: pairing.created_at,
                }),
            );
        }

        Some(pairing)
    }
}
