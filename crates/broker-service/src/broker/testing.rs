//! In-memory sink for unit tests inside this crate.

use super::registry::EventSink;
use crate::errors::BrokerError;
use crate::protocol::ServerEvent;
use common::types::ParticipantId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug)]
pub struct TestSink {
    id: ParticipantId,
    events: Mutex<Vec<ServerEvent>>,
    closed: AtomicBool,
}

impl TestSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: ParticipantId::new(),
            events: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn events(&self) -> Vec<ServerEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain everything received so far.
    pub fn take(&self) -> Vec<ServerEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Events other than `queue:count`.
    pub fn notifications(&self) -> Vec<ServerEvent> {
        self.events()
            .into_iter()
            .filter(|event| !matches!(event, ServerEvent::QueueCount(_)))
            .collect()
    }

    pub fn queue_counts(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::QueueCount(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl EventSink for TestSink {
    fn participant_id(&self) -> ParticipantId {
        self.id
    }

    fn send(&self, event: ServerEvent) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::ConnectionClosed);
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}
