//! Pairing table.
//!
//! A pairing is indexed under both participant ids or under neither. All
//! mutation goes through [`PairingTable::insert`] and
//! [`PairingTable::dissolve`], which update both keys together.

use crate::protocol::{Preferences, DEFAULT_PAIRING_QUALITY};
use chrono::{DateTime, Utc};
use common::types::{PairingId, ParticipantId};
use std::collections::HashMap;
use std::time::Instant;

/// Two participants bound into a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Pairing {
    pub id: PairingId,
    pub participant_a: ParticipantId,
    pub participant_b: ParticipantId,
    pub created_at: DateTime<Utc>,
    pub quality: u32,
    /// Monotonic creation time, used for duration metrics.
    pub started: Instant,
    /// What each side searched with, restored when skip or report re-queues them.
    pub preferences_a: Preferences,
    pub preferences_b: Preferences,
}

impl Pairing {
    #[must_use]
    pub fn new(participant_a: ParticipantId, participant_b: ParticipantId) -> Self {
        let created_at = Utc::now();
        Self {
            id: PairingId::derive(created_at, participant_a, participant_b),
            participant_a,
            participant_b,
            created_at,
            quality: DEFAULT_PAIRING_QUALITY,
            started: Instant::now(),
            preferences_a: Preferences::default(),
            preferences_b: Preferences::default(),
        }
    }

    #[must_use]
    pub fn with_preferences(mut self, a: Preferences, b: Preferences) -> Self {
        self.preferences_a = a;
        self.preferences_b = b;
        self
    }

    /// The preferences `id` searched with, if `id` is part of the pairing.
    #[must_use]
    pub fn preferences_of(&self, id: ParticipantId) -> Option<&Preferences> {
        if id == self.participant_a {
            Some(&self.preferences_a)
        } else if id == self.participant_b {
            Some(&self.preferences_b)
        } else {
            None
        }
    }

    /// The other side of the pairing, if `id` is part of it.
    #[must_use]
    pub fn peer_of(&self, id: ParticipantId) -> Option<ParticipantId> {
        if id == self.participant_a {
            Some(self.participant_b)
        } else if id == self.participant_b {
            Some(self.participant_a)
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct PairingTable {
    by_participant: HashMap<ParticipantId, PairingId>,
    pairings: HashMap<PairingId, Pairing>,
}

impl PairingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a pairing under both participants.
    ///
    /// Refused (returns `false`) if either side is already paired or the
    /// pairing binds a participant to itself.
    pub fn insert(&mut self, pairing: Pairing) -> bool {
        if pairing.participant_a == pairing.participant_b
            || self.by_participant.contains_key(&pairing.participant_a)
            || self.by_participant.contains_key(&pairing.participant_b)
        {
            return false;
        }

        self.by_participant
            .insert(pairing.participant_a, pairing.id.clone());
        self.by_participant
            .insert(pairing.participant_b, pairing.id.clone());
        self.pairings.insert(pairing.id.clone(), pairing);
        true
    }

    /// The pairing `id` belongs to.
    ///
    /// An index entry whose pairing is missing, or does not name `id`, is
    /// treated as absent.
    #[must_use]
    pub fn get(&self, id: ParticipantId) -> Option<&Pairing> {
        let pairing_id = self.by_participant.get(&id)?;
        self.pairings
            .get(pairing_id)
            .filter(|pairing| pairing.peer_of(id).is_some())
    }

    #[must_use]
    pub fn peer_of(&self, id: ParticipantId) -> Option<ParticipantId> {
        self.get(id).and_then(|pairing| pairing.peer_of(id))
    }

    #[must_use]
    pub fn is_paired(&self, id: ParticipantId) -> bool {
        self.get(id).is_some()
    }

    /// Remove the pairing `id` belongs to, unindexing both participants.
    ///
    /// A one-sided index entry for `id` is cleared as well.
    pub fn dissolve(&mut self, id: ParticipantId) -> Option<Pairing> {
        let pairing_id = self.by_participant.remove(&id)?;
        let pairing = self.pairings.remove(&pairing_id)?;

        for side in [pairing.participant_a, pairing.participant_b] {
            if self.by_participant.get(&side) == Some(&pairing.id) {
                self.by_participant.remove(&side);
            }
        }
        Some(pairing)
    }

    /// Number of live pairings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairings.is_empty()
    }

    /// Every participant id with an index entry.
    pub fn participants(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.by_participant.keys().copied()
    }
}
