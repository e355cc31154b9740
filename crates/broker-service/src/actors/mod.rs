//! Actor model implementation for the pairing broker.
//!
//! ```text
//! BrokerActor (singleton per broker instance)
//! ├── owns the Broker (queue, pairings, blocks, connection registry)
//! └── ConnectionActor (one per WebSocket, on a child cancellation token)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single writer**: only the `BrokerActor` touches broker state, so every
//!   event is applied to completion before the next one
//! - **Fire-and-forget notifications**: the broker pushes into connection
//!   mailboxes with `try_send`; a full mailbox drops the event
//! - **CancellationToken propagation**: connection actors run on child tokens
//!   of the broker's root token for graceful shutdown
//! - **Mailbox monitoring**: depth thresholds with metrics (Broker: 100/500, Connection: 50/200)
//!
//! # Modules
//!
//! - [`broker`] - `BrokerActor` singleton
//! - [`connection`] - `ConnectionActor` per WebSocket
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod broker;
pub mod connection;
pub mod messages;
pub mod metrics;

// Re-export primary types
pub use broker::{BrokerActor, BrokerActorHandle};
pub use connection::{ConnectionActor, ConnectionHandle, ConnectionSettings};
pub use messages::*;
pub use metrics::{ActorMetrics, ActorType, MailboxMonitor};
