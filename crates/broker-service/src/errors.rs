//! Pairing broker error types.
//!
//! The broker core never surfaces errors to participants: a failed match is
//! just continued waiting, a malformed event is dropped. These types exist
//! for the actor and transport boundary and for startup.

use crate::config::ConfigError;
use thiserror::Error;

/// Pairing broker error type.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Actor channel send/receive failed.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Broker is draining (graceful shutdown).
    #[error("Broker is draining")]
    Draining,

    /// The participant's connection is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The participant's outbound mailbox is full; the event was dropped.
    #[error("Connection mailbox full")]
    MailboxFull,

    /// Inbound frame could not be decoded.
    #[error("Malformed event: {0}")]
    Malformed(String),

    /// WebSocket transport error.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BrokerError {
    /// Returns a bounded label for metrics.
    #[must_use]
    pub fn metric_label(&self) -> &'static str {
        match self {
            BrokerError::Internal(_) => "internal",
            BrokerError::Draining => "draining",
            BrokerError::ConnectionClosed => "connection_closed",
            BrokerError::MailboxFull => "mailbox_full",
            BrokerError::Malformed(_) => "malformed",
            BrokerError::Transport(_) => "transport",
            BrokerError::Config(_) => "config",
        }
    }
}

impl From<ConfigError> for BrokerError {
    fn from(err: ConfigError) -> Self {
        BrokerError::Config(err.to_string())
    }
}
