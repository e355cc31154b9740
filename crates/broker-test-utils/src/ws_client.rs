//! WebSocket test client.
//!
//! `WsTestClient` plays one participant against a [`TestBrokerServer`],
//! speaking the same JSON event frames a browser would.

use crate::server_harness::TestBrokerServer;
use anyhow::{anyhow, bail, Context};
use broker_service::protocol::{ClientEvent, PairingFound, Preferences, ServerEvent};
use common::types::ParticipantId;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// How long `recv` waits for the next event.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(2);

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One participant connected over a real WebSocket.
pub struct WsTestClient {
    stream: Stream,
    participant_id: ParticipantId,
    recv_timeout: Duration,
}

impl WsTestClient {
    /// Connect to the server and consume the `connected` greeting.
    pub async fn connect(server: &TestBrokerServer) -> Result<Self, anyhow::Error> {
        Self::connect_url(&server.ws_url()).await
    }

    pub async fn connect_url(url: &str) -> Result<Self, anyhow::Error> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to {url}"))?;

        let mut client = Self {
            stream,
            participant_id: ParticipantId::new(),
            recv_timeout: DEFAULT_RECV_TIMEOUT,
        };

        match client.recv().await? {
            ServerEvent::Connected { participant_id } => client.participant_id = participant_id,
            other => bail!("expected connected, got {}", other.name()),
        }

        Ok(client)
    }

    /// Attempt an upgrade that the server is expected to refuse.
    ///
    /// Returns the HTTP status of the refusal.
    pub async fn connect_refused(server: &TestBrokerServer) -> Result<u16, anyhow::Error> {
        match tokio_tungstenite::connect_async(server.ws_url()).await {
            Ok(_) => bail!("upgrade unexpectedly accepted"),
            Err(WsError::Http(response)) => Ok(response.status().as_u16()),
            Err(e) => Err(anyhow!("unexpected connect error: {e}")),
        }
    }

    /// The id the broker assigned to this connection.
    pub fn participant_id(&self) -> ParticipantId {
        self.participant_id
    }

    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    pub async fn send(&mut self, event: &ClientEvent) -> Result<(), anyhow::Error> {
        self.send_raw(&event.encode()).await
    }

    /// Send an arbitrary text frame.
    pub async fn send_raw(&mut self, text: &str) -> Result<(), anyhow::Error> {
        self.stream
            .send(Message::Text(text.to_string()))
            .await
            .context("Failed to send text frame")
    }

    pub async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<(), anyhow::Error> {
        self.stream
            .send(Message::Binary(bytes))
            .await
            .context("Failed to send binary frame")
    }

    pub async fn search(&mut self) -> Result<(), anyhow::Error> {
        self.send(&ClientEvent::Search {
            preferences: Preferences::default(),
        })
        .await
    }

    /// Next event from the broker, skipping control frames.
    pub async fn recv(&mut self) -> Result<ServerEvent, anyhow::Error> {
        let deadline = self.recv_timeout;
        tokio::time::timeout(deadline, async {
            loop {
                let message = self
                    .stream
                    .next()
                    .await
                    .ok_or_else(|| anyhow!("connection ended"))?
                    .context("Failed to read frame")?;

                match message {
                    Message::Text(text) => {
                        return ServerEvent::decode(&text)
                            .map_err(|e| anyhow!("undecodable server event: {e}"));
                    }
                    Message::Close(frame) => bail!("connection closed: {frame:?}"),
                    _ => continue,
                }
            }
        })
        .await
        .map_err(|_| anyhow!("no event within {deadline:?}"))?
    }

    /// Next event that is not a `queue:count` broadcast.
    pub async fn recv_notification(&mut self) -> Result<ServerEvent, anyhow::Error> {
        loop {
            match self.recv().await? {
                ServerEvent::QueueCount(_) => continue,
                event => return Ok(event),
            }
        }
    }

    /// Next `queue:count` value, skipping other events.
    pub async fn recv_queue_count(&mut self) -> Result<usize, anyhow::Error> {
        loop {
            if let ServerEvent::QueueCount(n) = self.recv().await? {
                return Ok(n);
            }
        }
    }

    /// Wait for `found` and return its payload.
    pub async fn expect_found(&mut self) -> Result<PairingFound, anyhow::Error> {
        match self.recv_notification().await? {
            ServerEvent::Found(found) => Ok(found),
            other => bail!("expected found, got {}", other.name()),
        }
    }

    /// Wait for the given notification (by wire name).
    pub async fn expect(&mut self, name: &str) -> Result<ServerEvent, anyhow::Error> {
        let event = self.recv_notification().await?;
        if event.name() != name {
            bail!("expected {name}, got {}", event.name());
        }
        Ok(event)
    }

    /// Assert that no notification arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) -> Result<(), anyhow::Error> {
        let result = tokio::time::timeout(window, async {
            loop {
                match self.stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(ServerEvent::QueueCount(_)) = ServerEvent::decode(&text) {
                            continue;
                        }
                        return Some(text);
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(_)) | None => return None,
                }
            }
        })
        .await;

        match result {
            Ok(Some(text)) => bail!("unexpected event: {text}"),
            _ => Ok(()),
        }
    }

    /// Read until the server closes the connection.
    ///
    /// Returns the close frame, if the server sent one.
    pub async fn wait_closed(
        &mut self,
        within: Duration,
    ) -> Result<Option<CloseFrame<'static>>, anyhow::Error> {
        tokio::time::timeout(within, async {
            loop {
                match self.stream.next().await {
                    Some(Ok(Message::Close(frame))) => return frame,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) | None => return None,
                }
            }
        })
        .await
        .map_err(|_| anyhow!("connection still open after {within:?}"))
    }

    /// Close the connection from the client side.
    pub async fn close(mut self) -> Result<(), anyhow::Error> {
        self.stream
            .close(None)
            .await
            .context("Failed to close connection")
    }
}
