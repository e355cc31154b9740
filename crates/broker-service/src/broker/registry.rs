//! Connection registry: participant id to outbound channel.
//!
//! The registry never owns a connection's lifecycle. Transport code inserts a
//! sink when a socket is accepted and removes it after the broker has torn the
//! participant down. Lookups of stale ids are silent no-ops.

use crate::errors::BrokerError;
use crate::observability::metrics;
use crate::protocol::ServerEvent;
use common::types::ParticipantId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Outbound capability of a connected participant.
///
/// Implementations must not block: notifications are fire-and-forget.
pub trait EventSink: Send + Sync + fmt::Debug {
    /// Id of the participant this sink delivers to.
    fn participant_id(&self) -> ParticipantId;

    /// Queue an event for delivery.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` if the connection is gone, or `MailboxFull`
    /// if the event had to be dropped.
    fn send(&self, event: ServerEvent) -> Result<(), BrokerError>;
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sinks: HashMap<ParticipantId, Arc<dyn EventSink>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink under its participant id, returning any sink it replaced.
    pub fn insert(&mut self, sink: Arc<dyn EventSink>) -> Option<Arc<dyn EventSink>> {
        self.sinks.insert(sink.participant_id(), sink)
    }

    pub fn remove(&mut self, id: ParticipantId) -> Option<Arc<dyn EventSink>> {
        self.sinks.remove(&id)
    }

    #[must_use]
    pub fn contains(&self, id: ParticipantId) -> bool {
        self.sinks.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver an event to one participant.
    ///
    /// Returns `false` if the id is unknown or the sink rejected the event.
    /// Neither case is an error for the caller.
    pub fn send(&self, id: ParticipantId, event: ServerEvent) -> bool {
        let Some(sink) = self.sinks.get(&id) else {
            debug!(
                target: "broker.core",
                participant_id = %id,
                event = event.name(),
                "Dropping event for unknown participant"
            );
            metrics::record_event_dropped("stale_target");
            return false;
        };

        deliver(sink.as_ref(), event)
    }

    /// Deliver an event to every connected participant.
    pub fn broadcast(&self, event: &ServerEvent) {
        for sink in self.sinks.values() {
            deliver(sink.as_ref(), event.clone());
        }
    }
}

fn deliver(sink: &dyn EventSink, event: ServerEvent) -> bool {
    let name = event.name();
    match sink.send(event) {
        Ok(()) => true,
        Err(e) => {
            debug!(
                target: "broker.core",
                participant_id = %sink.participant_id(),
                event = name,
                error = %e,
                "Event not delivered"
            );
            metrics::record_event_dropped(e.metric_label());
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::broker::testing::TestSink;

    #[test]
    fn test_insert_and_lookup() {
        let mut registry = ConnectionRegistry::new();
        let sink = TestSink::new();
        let id = sink.participant_id();

        assert!(registry.insert(sink).is_none());
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(id).is_some());
        assert!(!registry.contains(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_send_to_unknown_id_is_noop() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.send(ParticipantId::new(), ServerEvent::Cancelled));
    }

    #[test]
    fn test_send_reports_rejected_delivery() {
        let mut registry = ConnectionRegistry::new();
        let sink = TestSink::new();
        let id = sink.participant_id();
        registry.insert(sink.clone());

        assert!(registry.send(id, ServerEvent::Skipped));
        sink.close();
        assert!(!registry.send(id, ServerEvent::Skipped));
        assert_eq!(sink.events(), vec![ServerEvent::Skipped]);
    }

    #[test]
    fn test_broadcast_reaches_every_sink() {
        let mut registry = ConnectionRegistry::new();
        let a = TestSink::new();
        let b = TestSink::new();
        registry.insert(a.clone());
        registry.insert(b.clone());

        registry.broadcast(&ServerEvent::QueueCount(4));

        assert_eq!(a.events(), vec![ServerEvent::QueueCount(4)]);
        assert_eq!(b.events(), vec![ServerEvent::QueueCount(4)]);
    }
}
