//! In-memory event sink.
//!
//! `RecordingSink` stands in for a connection when tests drive the
//! [`Broker`] core directly, without actors or sockets.
//!
//! [`Broker`]: broker_service::broker::Broker

use broker_service::broker::EventSink;
use broker_service::errors::BrokerError;
use broker_service::protocol::{PairingFound, ServerEvent};
use common::types::ParticipantId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Records every event the broker sends to one participant.
///
/// # Example
/// ```rust,ignore
/// let alice = RecordingSink::new();
/// broker.connect(alice.clone());
/// assert_eq!(alice.queue_counts(), vec![0]);
/// ```
#[derive(Debug)]
pub struct RecordingSink {
    id: ParticipantId,
    events: Mutex<Vec<ServerEvent>>,
    closed: AtomicBool,
}

impl RecordingSink {
    /// Create a sink with a fresh participant id.
    pub fn new() -> Arc<Self> {
        Self::with_id(ParticipantId::new())
    }

    pub fn with_id(id: ParticipantId) -> Arc<Self> {
        Arc::new(Self {
            id,
            events: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// Everything received so far, in order.
    pub fn events(&self) -> Vec<ServerEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Drain everything received so far.
    pub fn take(&self) -> Vec<ServerEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    /// Events other than `queue:count` broadcasts.
    pub fn notifications(&self) -> Vec<ServerEvent> {
        self.events()
            .into_iter()
            .filter(|event| !matches!(event, ServerEvent::QueueCount(_)))
            .collect()
    }

    /// Every `queue:count` value received, in order.
    pub fn queue_counts(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::QueueCount(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// The most recent `found` payload, if any.
    pub fn last_found(&self) -> Option<PairingFound> {
        self.events().into_iter().rev().find_map(|event| match event {
            ServerEvent::Found(found) => Some(found),
            _ => None,
        })
    }

    /// Count received events with the given wire name.
    pub fn count(&self, name: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| event.name() == name)
            .count()
    }

    /// Simulate a dead transport: later sends fail with `ConnectionClosed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl EventSink for RecordingSink {
    fn participant_id(&self) -> ParticipantId {
        self.id
    }

    fn send(&self, event: ServerEvent) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::ConnectionClosed);
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_order() {
        let sink = RecordingSink::new();
        sink.send(ServerEvent::QueueCount(1)).unwrap();
        sink.send(ServerEvent::Like).unwrap();

        assert_eq!(sink.queue_counts(), vec![1]);
        assert_eq!(sink.notifications(), vec![ServerEvent::Like]);
        assert_eq!(sink.count("like"), 1);
        assert_eq!(sink.take().len(), 2);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_closed_sink_refuses_events() {
        let sink = RecordingSink::new();
        sink.close();
        assert!(matches!(
            sink.send(ServerEvent::Cancelled),
            Err(BrokerError::ConnectionClosed)
        ));
    }
}
