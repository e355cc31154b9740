//! `BrokerActor` - singleton owner of the pairing broker.
//!
//! The `BrokerActor` is the top-level actor:
//!
//! - Singleton per broker instance
//! - Owns the [`Broker`] and applies every event to it in mailbox order, so
//!   broker state is only ever touched by one task
//! - Owns the root `CancellationToken`; connection actors run on child tokens
//!
//! # Graceful Shutdown
//!
//! On SIGTERM, the actor:
//! 1. Stops accepting new connections (`Connect` fails with `Draining`)
//! 2. Cancels the root `CancellationToken` (connection actors close their sockets)
//! 3. Exits its message loop

use crate::broker::{Broker, BrokerStatus, EventSink, ParticipantState};
use crate::errors::BrokerError;
use crate::observability::metrics;
use crate::protocol::ClientEvent;

use super::messages::BrokerMessage;
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use common::types::ParticipantId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Default channel buffer size for the broker mailbox.
const BROKER_CHANNEL_BUFFER: usize = 4096;

/// Handle to the `BrokerActor`.
///
/// This is the public interface for interacting with the broker.
#[derive(Clone, Debug)]
pub struct BrokerActorHandle {
    sender: mpsc::Sender<BrokerMessage>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
}

impl BrokerActorHandle {
    /// Create a new `BrokerActor` and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    #[must_use]
    pub fn new(broker_id: String, metrics: Arc<ActorMetrics>) -> Self {
        Self::spawn(broker_id, metrics).0
    }

    /// Like [`BrokerActorHandle::new`], also returning the actor's task handle.
    #[must_use]
    pub fn spawn(broker_id: String, metrics: Arc<ActorMetrics>) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(BROKER_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();
        let mailbox = Arc::new(MailboxMonitor::new(ActorType::Broker, &broker_id));

        let actor = BrokerActor {
            broker_id,
            receiver,
            cancel_token: cancel_token.clone(),
            broker: Broker::new(),
            accepting_new: true,
            metrics,
            mailbox: Arc::clone(&mailbox),
        };

        let task_handle = tokio::spawn(actor.run());

        (
            Self {
                sender,
                cancel_token,
                mailbox,
            },
            task_handle,
        )
    }

    async fn post(&self, message: BrokerMessage) -> Result<(), BrokerError> {
        self.mailbox.record_enqueue();
        self.sender
            .send(message)
            .await
            .map_err(|e| BrokerError::Internal(format!("channel send failed: {e}")))
    }

    /// Register a connection. Fails with `Draining` during shutdown.
    pub async fn connect(&self, sink: Arc<dyn EventSink>) -> Result<(), BrokerError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.post(BrokerMessage::Connect {
            sink,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| BrokerError::Internal(format!("response receive failed: {e}")))?
    }

    /// Report a closed connection. Teardown happens asynchronously.
    pub async fn disconnect(&self, participant_id: ParticipantId) -> Result<(), BrokerError> {
        self.post(BrokerMessage::Disconnect { participant_id }).await
    }

    /// Hand an inbound event to the broker.
    pub async fn dispatch(
        &self,
        participant_id: ParticipantId,
        event: ClientEvent,
    ) -> Result<(), BrokerError> {
        self.post(BrokerMessage::Dispatch {
            participant_id,
            event,
            received_at: Instant::now(),
        })
        .await
    }

    /// Get the current broker counts.
    pub async fn get_status(&self) -> Result<BrokerStatus, BrokerError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.post(BrokerMessage::GetStatus { respond_to: tx })
            .await?;

        rx.await
            .map_err(|e| BrokerError::Internal(format!("response receive failed: {e}")))
    }

    /// Get one participant's lifecycle state.
    pub async fn participant_state(
        &self,
        participant_id: ParticipantId,
    ) -> Result<ParticipantState, BrokerError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.post(BrokerMessage::GetParticipantState {
            participant_id,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| BrokerError::Internal(format!("response receive failed: {e}")))
    }

    /// Initiate graceful shutdown.
    ///
    /// Returns once new connections are refused and every connection actor
    /// has been told to close. Waiting for them to finish is up to the caller.
    pub async fn shutdown(&self) -> Result<(), BrokerError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.post(BrokerMessage::Shutdown { respond_to: tx })
            .await?;

        rx.await
            .map_err(|e| BrokerError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for spawning connection actors.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// The `BrokerActor` implementation.
///
/// This struct owns the broker state and runs the message loop.
pub struct BrokerActor {
    broker_id: String,
    receiver: mpsc::Receiver<BrokerMessage>,
    /// Cancellation token (root).
    cancel_token: CancellationToken,
    broker: Broker,
    /// Whether new connections are accepted.
    accepting_new: bool,
    metrics: Arc<ActorMetrics>,
    /// Shared with every handle, which records enqueues.
    mailbox: Arc<MailboxMonitor>,
}

impl BrokerActor {
    /// Run the actor message loop.
    #[instrument(skip_all, name = "broker.actor.broker", fields(broker_id = %self.broker_id))]
    async fn run(mut self) {
        info!(
            target: "broker.actor.broker",
            broker_id = %self.broker_id,
            "BrokerActor started"
        );

        loop {
            tokio::select! {
                // Handle cancellation
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "broker.actor.broker",
                        broker_id = %self.broker_id,
                        "BrokerActor received cancellation signal"
                    );
                    self.graceful_shutdown();
                    break;
                }

                // Handle messages
                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message);
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "broker.actor.broker",
                                broker_id = %self.broker_id,
                                "BrokerActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        let status = self.broker.snapshot();
        info!(
            target: "broker.actor.broker",
            broker_id = %self.broker_id,
            connections_remaining = status.connections,
            messages_processed = self.mailbox.messages_processed(),
            peak_mailbox_depth = self.mailbox.peak_depth(),
            "BrokerActor stopped"
        );
    }

    /// Handle a single message.
    fn handle_message(&mut self, message: BrokerMessage) {
        match message {
            BrokerMessage::Connect { sink, respond_to } => {
                let result = self.connect(sink);
                let _ = respond_to.send(result);
            }

            BrokerMessage::Disconnect { participant_id } => {
                self.broker.disconnect(participant_id);
            }

            BrokerMessage::Dispatch {
                participant_id,
                event,
                received_at,
            } => {
                let name = event.name();
                self.broker.handle(participant_id, event);
                metrics::record_event_latency(name, received_at.elapsed());
            }

            BrokerMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.broker.snapshot());
            }

            BrokerMessage::GetParticipantState {
                participant_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.broker.participant_state(participant_id));
            }

            BrokerMessage::Shutdown { respond_to } => {
                let result = self.initiate_shutdown();
                let _ = respond_to.send(result);
            }
        }
    }

    fn connect(&mut self, sink: Arc<dyn EventSink>) -> Result<(), BrokerError> {
        if !self.accepting_new {
            return Err(BrokerError::Draining);
        }
        self.broker.connect(sink);
        Ok(())
    }

    /// Initiate graceful shutdown.
    fn initiate_shutdown(&mut self) -> Result<(), BrokerError> {
        let status = self.broker.snapshot();
        info!(
            target: "broker.actor.broker",
            broker_id = %self.broker_id,
            connections = status.connections,
            "Initiating graceful shutdown"
        );

        self.accepting_new = false;

        // Cancel the root token (propagates to all connection actors)
        self.cancel_token.cancel();

        Ok(())
    }

    fn graceful_shutdown(&mut self) {
        self.accepting_new = false;
        let status = self.broker.snapshot();

        debug!(
            target: "broker.actor.broker",
            broker_id = %self.broker_id,
            connections = status.connections,
            queue_depth = status.queue_depth,
            pairings_active = status.pairings_active,
            "Dropping broker state"
        );
    }
}
