//! Waiting queue.
//!
//! Insertion-ordered, no duplicate ids. Depths stay small enough for a
//! linear scan, so a `VecDeque` is all that is needed.

use crate::protocol::Preferences;
use common::types::ParticipantId;
use std::collections::VecDeque;
use std::time::Instant;

/// A participant waiting for a peer.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: ParticipantId,
    pub preferences: Preferences,
    pub enqueued_at: Instant,
}

impl QueueEntry {
    #[must_use]
    pub fn new(id: ParticipantId, preferences: Preferences) -> Self {
        Self {
            id,
            preferences,
            enqueued_at: Instant::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct WaitingQueue {
    entries: VecDeque<QueueEntry>,
}

impl WaitingQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail. Returns `false` (and leaves the queue untouched)
    /// if the id is already queued.
    pub fn push_back(&mut self, entry: QueueEntry) -> bool {
        if self.contains(entry.id) {
            return false;
        }
        self.entries.push_back(entry);
        true
    }

    pub fn remove(&mut self, id: ParticipantId) -> Option<QueueEntry> {
        let index = self.entries.iter().position(|entry| entry.id == id)?;
        self.entries.remove(index)
    }

    #[must_use]
    pub fn contains(&self, id: ParticipantId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<ParticipantId> {
        self.entries.iter().map(|entry| entry.id).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
