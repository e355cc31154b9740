//! Block registry.
//!
//! Storage is directional (observer -> targets) but the matching check looks
//! both ways. Entries live for the process lifetime; there is no removal.

use common::types::ParticipantId;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct BlockRegistry {
    blocked: HashMap<ParticipantId, HashSet<ParticipantId>>,
}

impl BlockRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `observer` refuses to be paired with `target`.
    ///
    /// Idempotent. Returns `true` if the block was new. Self-blocks are ignored.
    pub fn add_block(&mut self, observer: ParticipantId, target: ParticipantId) -> bool {
        if observer == target {
            return false;
        }
        self.blocked.entry(observer).or_default().insert(target)
    }

    /// True if either participant has blocked the other.
    #[must_use]
    pub fn is_blocked(&self, a: ParticipantId, b: ParticipantId) -> bool {
        self.has_blocked(a, b) || self.has_blocked(b, a)
    }

    /// True if `observer` itself blocked `target` (one direction only).
    #[must_use]
    pub fn has_blocked(&self, observer: ParticipantId, target: ParticipantId) -> bool {
        self.blocked
            .get(&observer)
            .is_some_and(|targets| targets.contains(&target))
    }

    /// Total number of block relations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocked.values().map(HashSet::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
