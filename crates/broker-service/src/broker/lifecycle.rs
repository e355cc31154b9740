//! Session lifecycle: cancel, skip, report, and the shared teardown.

use super::{Broker, EndReason, Pairing, QueueEntry};
use crate::observability::metrics;
use crate::protocol::{Preferences, ServerEvent};
use common::types::ParticipantId;
use tracing::{debug, info, warn};

impl Broker {
    /// Stop searching, or end the current pairing. Self is not re-queued.
    pub fn cancel(&mut self, id: ParticipantId) {
        self.teardown(id, EndReason::Cancel);
        self.finish_event();
    }

    /// End the current pairing and put both sides back in the queue.
    pub fn skip(&mut self, id: ParticipantId) {
        let Some(peer_id) = self.pairings.peer_of(id) else {
            debug!(target: "broker.core", participant_id = %id, "Skip without pairing ignored");
            return;
        };

        let pairing = self.end_pairing(id, EndReason::Skip);
        self.connections.send(peer_id, ServerEvent::Skipped);
        self.requeue(id, searched_with(pairing.as_ref(), id));
        self.requeue(peer_id, searched_with(pairing.as_ref(), peer_id));
        self.finish_event();
    }

    /// End the current pairing, block the peer and re-queue only self.
    ///
    /// `target` is informational. The blocked participant is always the
    /// current peer.
    pub fn report(&mut self, id: ParticipantId, target: Option<ParticipantId>) {
        let Some(peer_id) = self.pairings.peer_of(id) else {
            debug!(target: "broker.core", participant_id = %id, "Report without pairing ignored");
            return;
        };

        if let Some(target) = target.filter(|target| *target != peer_id) {
            warn!(
                target: "broker.core",
                participant_id = %id,
                peer_id = %peer_id,
                reported = %target,
                "Report target does not match current peer, reporting peer"
            );
        }

        self.blocks.add_block(id, peer_id);
        let pairing = self.end_pairing(id, EndReason::Report);
        self.connections.send(peer_id, ServerEvent::Reported);
        self.requeue(id, searched_with(pairing.as_ref(), id));
        self.finish_event();
    }

    /// Shared teardown for cancel, disconnect and re-search.
    ///
    /// Dissolves `id`'s pairing, tells the peer `cancelled` and gives the peer
    /// a fresh queue entry with empty preferences if it is still connected.
    /// Finally removes `id` from the queue. Does not broadcast.
    pub(super) fn teardown(&mut self, id: ParticipantId, reason: EndReason) {
        if let Some(peer_id) = self
            .end_pairing(id, reason)
            .and_then(|pairing| pairing.peer_of(id))
        {
            self.connections.send(peer_id, ServerEvent::Cancelled);
            if !self.queue.contains(peer_id) {
                self.requeue(peer_id, Preferences::default());
            }
        }
        self.queue.remove(id);
    }

    fn end_pairing(&mut self, id: ParticipantId, reason: EndReason) -> Option<Pairing> {
        let pairing = self.pairings.dissolve(id)?;
        let duration = pairing.started.elapsed();

        metrics::record_session_ended(reason.as_str(), duration);
        info!(
            target: "broker.core",
            pairing_id = %pairing.id,
            participant_id = %id,
            reason = reason.as_str(),
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            "Pairing ended"
        );
        Some(pairing)
    }

    /// Append `id` without matching.
    ///
    /// Skipped for participants that are gone or still paired.
    fn requeue(&mut self, id: ParticipantId, preferences: Preferences) -> bool {
        if !self.connections.contains(id) || self.pairings.is_paired(id) {
            return false;
        }
        self.queue.push_back(QueueEntry::new(id, preferences))
    }
}

fn searched_with(pairing: Option<&Pairing>, id: ParticipantId) -> Preferences {
    pairing
        .and_then(|pairing| pairing.preferences_of(id))
        .cloned()
        .unwrap_or_default()
}
