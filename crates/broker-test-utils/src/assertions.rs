//! Custom test assertions for expressive broker tests
//!
//! Provides trait-based assertions over the broker core's state.

use broker_service::broker::{Broker, ParticipantState};
use common::types::ParticipantId;

/// Panic with every violated cross-structure invariant.
pub fn assert_invariants(broker: &Broker) {
    let violations = broker.invariant_violations();
    assert!(
        violations.is_empty(),
        "broker invariants violated:\n  {}",
        violations.join("\n  ")
    );
}

/// Custom assertions for broker state
///
/// # Example
/// ```rust,ignore
/// broker
///     .assert_consistent()
///     .assert_paired(alice.id(), bob.id())
///     .assert_queue(&[carol.id()]);
/// ```
pub trait BrokerAssertions {
    /// Assert that no invariant is violated
    fn assert_consistent(&self) -> &Self;

    /// Assert a participant's lifecycle state
    fn assert_state(&self, id: ParticipantId, expected: ParticipantState) -> &Self;

    /// Assert that `a` and `b` share one pairing
    fn assert_paired(&self, a: ParticipantId, b: ParticipantId) -> &Self;

    /// Assert the exact waiting queue, head first
    fn assert_queue(&self, expected: &[ParticipantId]) -> &Self;
}

impl BrokerAssertions for Broker {
    fn assert_consistent(&self) -> &Self {
        assert_invariants(self);
        self
    }

    fn assert_state(&self, id: ParticipantId, expected: ParticipantState) -> &Self {
        let actual = self.participant_state(id);
        assert_eq!(
            actual, expected,
            "participant {id} expected {expected:?}, got {actual:?}"
        );
        self
    }

    fn assert_paired(&self, a: ParticipantId, b: ParticipantId) -> &Self {
        let pairing = self
            .pairing_of(a)
            .unwrap_or_else(|| panic!("participant {a} is not paired"));
        assert_eq!(
            pairing.peer_of(a),
            Some(b),
            "participant {a} is paired with someone other than {b}"
        );
        let other = self
            .pairing_of(b)
            .unwrap_or_else(|| panic!("participant {b} is not paired"));
        assert_eq!(pairing.id, other.id, "pairing ids differ between sides");
        self
    }

    fn assert_queue(&self, expected: &[ParticipantId]) -> &Self {
        assert_eq!(self.queued(), expected, "unexpected waiting queue");
        self
    }
}
