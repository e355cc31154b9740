//! Common data types for Tandem components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a participant.
///
/// Assigned by the transport when a connection is accepted and stable for the
/// lifetime of that connection. Serialized as the hyphenated UUID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub Uuid);

impl ParticipantId {
    /// Create a new random participant ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ParticipantId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Unique identifier for a pairing of two participants.
///
/// Built from the creation time and both participant ids, which is
/// collision-free because participant ids are unique at any instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairingId(pub String);

impl PairingId {
    /// Derive the pairing id for two participants bound at `created_at`.
    #[must_use]
    pub fn derive(created_at: DateTime<Utc>, a: ParticipantId, b: ParticipantId) -> Self {
        Self(format!("{}-{a}-{b}", created_at.timestamp_millis()))
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_participant_ids_are_unique() {
        assert_ne!(ParticipantId::new(), ParticipantId::new());
    }

    #[test]
    fn test_participant_id_parses_its_display_form() {
        let id = ParticipantId::new();
        let parsed: ParticipantId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_participant_id_rejects_garbage() {
        assert!("not-a-participant".parse::<ParticipantId>().is_err());
        assert!("".parse::<ParticipantId>().is_err());
    }

    #[test]
    fn test_participant_id_serializes_as_plain_string() {
        let id = ParticipantId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn test_pairing_id_contains_time_and_both_participants() {
        let a = ParticipantId::new();
        let b = ParticipantId::new();
        let created_at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();

        let id = PairingId::derive(created_at, a, b);

        assert!(id.as_str().starts_with("1700000000123-"));
        assert!(id.as_str().contains(&a.to_string()));
        assert!(id.as_str().ends_with(&b.to_string()));
    }
}
