//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via `tokio::sync::mpsc`.
//! Response patterns use `tokio::sync::oneshot` for request-reply semantics.

use crate::broker::{BrokerStatus, EventSink, ParticipantState};
use crate::errors::BrokerError;
use crate::protocol::{ClientEvent, ServerEvent};
use common::types::ParticipantId;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Messages sent to `BrokerActor`.
#[derive(Debug)]
pub enum BrokerMessage {
    /// Register a freshly accepted connection.
    Connect {
        sink: Arc<dyn EventSink>,
        /// Fails with `Draining` once shutdown has started.
        respond_to: oneshot::Sender<Result<(), BrokerError>>,
    },

    /// The participant's transport is gone.
    Disconnect { participant_id: ParticipantId },

    /// An inbound event decoded from the participant's socket.
    Dispatch {
        participant_id: ParticipantId,
        event: ClientEvent,
        /// When the frame was read, for latency metrics.
        received_at: Instant,
    },

    /// Get current broker counts (for the stats endpoint).
    GetStatus {
        respond_to: oneshot::Sender<BrokerStatus>,
    },

    /// Get one participant's lifecycle state.
    GetParticipantState {
        participant_id: ParticipantId,
        respond_to: oneshot::Sender<ParticipantState>,
    },

    /// Initiate graceful shutdown (SIGTERM received).
    Shutdown {
        respond_to: oneshot::Sender<Result<(), BrokerError>>,
    },
}

/// Messages sent to `ConnectionActor`.
#[derive(Debug)]
pub enum ConnectionMessage {
    /// Serialize and write an event to the socket.
    Send { event: ServerEvent },
}
