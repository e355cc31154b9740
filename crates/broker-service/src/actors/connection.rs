//! `ConnectionActor` - per-WebSocket connection actor.
//!
//! Each `ConnectionActor`:
//! - Owns exactly one participant's WebSocket
//! - Decodes inbound frames and dispatches them to the `BrokerActor`
//! - Writes broker notifications queued in its outbound mailbox
//! - Sends keepalive pings and closes the socket after `idle_timeout` of silence
//!
//! # Lifecycle
//!
//! 1. Created by the transport when an upgrade completes; its handle is
//!    registered with the broker before the actor starts reading
//! 2. Runs until the peer closes, the socket errors, the idle timeout
//!    fires, or the broker's root token is cancelled
//! 3. The transport then reports the disconnect to the broker

use crate::broker::EventSink;
use crate::errors::BrokerError;
use crate::observability::metrics;
use crate::protocol::{ClientEvent, ServerEvent};

use super::broker::BrokerActorHandle;
use super::messages::ConnectionMessage;
use super::metrics::{ActorType, MailboxMonitor};

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use common::types::ParticipantId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// How long a closing socket waits for the peer's Close reply.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Keepalive and buffering settings for a connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub ping_interval: Duration,
    pub idle_timeout: Duration,
    /// Outbound mailbox capacity.
    pub mailbox: usize,
}

/// Handle to a `ConnectionActor`.
///
/// Implements [`EventSink`]: the broker pushes notifications through it
/// without ever waiting on the socket.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    sender: mpsc::Sender<ConnectionMessage>,
    participant_id: ParticipantId,
    mailbox: Arc<MailboxMonitor>,
}

impl EventSink for ConnectionHandle {
    fn participant_id(&self) -> ParticipantId {
        self.participant_id
    }

    fn send(&self, event: ServerEvent) -> Result<(), BrokerError> {
        match self.sender.try_send(ConnectionMessage::Send { event }) {
            Ok(()) => {
                self.mailbox.record_enqueue();
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.mailbox.record_drop();
                Err(BrokerError::MailboxFull)
            }
            Err(TrySendError::Closed(_)) => Err(BrokerError::ConnectionClosed),
        }
    }
}

/// Why the actor loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    Cancelled,
    PeerClosed,
    IdleTimeout,
    SocketError,
    BrokerGone,
}

impl CloseReason {
    const fn as_str(self) -> &'static str {
        match self {
            CloseReason::Cancelled => "cancelled",
            CloseReason::PeerClosed => "peer_closed",
            CloseReason::IdleTimeout => "idle_timeout",
            CloseReason::SocketError => "socket_error",
            CloseReason::BrokerGone => "broker_gone",
        }
    }

    /// Close frame the server owes the peer, if the socket is still usable.
    const fn close_frame(self) -> Option<(u16, &'static str)> {
        match self {
            CloseReason::Cancelled | CloseReason::BrokerGone => {
                Some((close_code::AWAY, "server shutting down"))
            }
            CloseReason::IdleTimeout => Some((close_code::AWAY, "idle timeout")),
            CloseReason::PeerClosed | CloseReason::SocketError => None,
        }
    }
}

/// The `ConnectionActor` implementation.
pub struct ConnectionActor {
    participant_id: ParticipantId,
    socket: WebSocket,
    receiver: mpsc::Receiver<ConnectionMessage>,
    broker: BrokerActorHandle,
    /// Cancellation token (child of the broker's root token).
    cancel_token: CancellationToken,
    settings: ConnectionSettings,
    mailbox: Arc<MailboxMonitor>,
    last_seen: Instant,
}

impl ConnectionActor {
    /// Build an actor and its handle without starting it.
    ///
    /// Register the handle with the broker first, then `run` the actor, so
    /// no inbound event can reach the broker before the participant exists.
    #[must_use]
    pub fn new(
        participant_id: ParticipantId,
        socket: WebSocket,
        broker: BrokerActorHandle,
        cancel_token: CancellationToken,
        settings: ConnectionSettings,
    ) -> (Self, ConnectionHandle) {
        let (sender, receiver) = mpsc::channel(settings.mailbox);
        let mailbox = Arc::new(MailboxMonitor::new(
            ActorType::Connection,
            participant_id.to_string(),
        ));

        let actor = Self {
            participant_id,
            socket,
            receiver,
            broker,
            cancel_token,
            settings,
            mailbox: Arc::clone(&mailbox),
            last_seen: Instant::now(),
        };

        let handle = ConnectionHandle {
            sender,
            participant_id,
            mailbox,
        };

        (actor, handle)
    }

    /// Run the actor loop until the connection ends.
    #[instrument(
        skip_all,
        name = "broker.actor.connection",
        fields(participant_id = %self.participant_id)
    )]
    pub async fn run(mut self) {
        debug!(
            target: "broker.actor.connection",
            participant_id = %self.participant_id,
            "ConnectionActor started"
        );

        let mut keepalive = tokio::time::interval_at(
            Instant::now() + self.settings.ping_interval,
            self.settings.ping_interval,
        );
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                // Cancellation first: on shutdown the broker drops our mailbox
                // sender right after cancelling.
                biased;

                () = self.cancel_token.cancelled() => break CloseReason::Cancelled,

                // Outbound notifications
                msg = self.receiver.recv() => {
                    let Some(ConnectionMessage::Send { event }) = msg else {
                        break CloseReason::BrokerGone;
                    };
                    self.mailbox.record_dequeue();
                    if let Err(e) = self.write(&event).await {
                        debug!(
                            target: "broker.actor.connection",
                            participant_id = %self.participant_id,
                            error = %e,
                            "Write failed"
                        );
                        break CloseReason::SocketError;
                    }
                }

                // Inbound frames
                frame = self.socket.recv() => {
                    if let Some(reason) = self.handle_frame(frame).await {
                        break reason;
                    }
                }

                // Keepalive
                _ = keepalive.tick() => {
                    if self.last_seen.elapsed() >= self.settings.idle_timeout {
                        break CloseReason::IdleTimeout;
                    }
                    if self.socket.send(Message::Ping(Vec::new())).await.is_err() {
                        break CloseReason::SocketError;
                    }
                }
            }
        };

        if let Some((code, text)) = reason.close_frame() {
            self.close(code, text).await;
        }

        info!(
            target: "broker.actor.connection",
            participant_id = %self.participant_id,
            reason = reason.as_str(),
            messages_sent = self.mailbox.messages_processed(),
            peak_mailbox_depth = self.mailbox.peak_depth(),
            "ConnectionActor stopped"
        );
    }

    /// Handle one inbound socket item. Returns a reason when the loop should end.
    async fn handle_frame(
        &mut self,
        frame: Option<Result<Message, axum::Error>>,
    ) -> Option<CloseReason> {
        let message = match frame {
            None => return Some(CloseReason::PeerClosed),
            Some(Err(e)) => {
                debug!(
                    target: "broker.actor.connection",
                    participant_id = %self.participant_id,
                    error = %e,
                    "Socket read failed"
                );
                return Some(CloseReason::SocketError);
            }
            Some(Ok(message)) => message,
        };

        self.last_seen = Instant::now();

        match message {
            Message::Text(text) => match ClientEvent::decode(&text) {
                Ok(event) => {
                    if let Err(e) = self.broker.dispatch(self.participant_id, event).await {
                        warn!(
                            target: "broker.actor.connection",
                            participant_id = %self.participant_id,
                            error = %e,
                            "Broker unavailable"
                        );
                        return Some(CloseReason::BrokerGone);
                    }
                }
                Err(e) => {
                    debug!(
                        target: "broker.actor.connection",
                        participant_id = %self.participant_id,
                        error = %e,
                        "Dropping malformed frame"
                    );
                    metrics::record_event_dropped(e.metric_label());
                }
            },
            Message::Binary(_) => {
                debug!(
                    target: "broker.actor.connection",
                    participant_id = %self.participant_id,
                    "Dropping binary frame"
                );
                metrics::record_event_dropped("malformed");
            }
            // Pongs only refresh `last_seen`; pings are answered by the socket.
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => return Some(CloseReason::PeerClosed),
        }

        None
    }

    async fn write(&mut self, event: &ServerEvent) -> Result<(), BrokerError> {
        let frame = event.encode()?;
        self.socket
            .send(Message::Text(frame))
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))
    }

    async fn close(&mut self, code: u16, reason: &'static str) {
        let frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        if let Err(e) = self.socket.send(Message::Close(Some(frame))).await {
            debug!(
                target: "broker.actor.connection",
                participant_id = %self.participant_id,
                error = %e,
                "Close frame not sent"
            );
            return;
        }

        // Keep reading until the peer answers. Dropping the socket with
        // unread frames resets the connection and loses our Close.
        let socket = &mut self.socket;
        let acknowledged = tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, async {
            while let Some(Ok(message)) = socket.recv().await {
                if matches!(message, Message::Close(_)) {
                    break;
                }
            }
        })
        .await
        .is_ok();

        if !acknowledged {
            debug!(
                target: "broker.actor.connection",
                participant_id = %self.participant_id,
                "Peer did not acknowledge close"
            );
        }
    }
}
