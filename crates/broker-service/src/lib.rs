//! Tandem Pairing Broker Library
//!
//! The broker pairs anonymous participants one-to-one for a video chat and
//! relays the WebRTC signaling they need to connect to each other directly:
//!
//! - A FIFO waiting queue with a first-eligible match (no self-match,
//!   no blocked pairs)
//! - Session lifecycle: search, cancel, skip, report, block, disconnect
//! - Relay of offers, answers and ICE candidates, plus likes and emoji
//! - Queue length broadcasts to every connected participant
//!
//! Media never passes through the broker.
//!
//! # Architecture
//!
//! ```text
//! BrokerActor (singleton per broker instance)
//! ├── owns the Broker core (registry, blocks, queue, pairings)
//! └── ConnectionActor (one per WebSocket)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single-writer core**: the [`broker::Broker`] is plain synchronous state
//!   mutated only by the broker actor, so each event is atomic
//! - **Transport-agnostic core**: the core reaches participants only through
//!   the [`broker::EventSink`] trait
//! - **Fire-and-forget notifications**: a stale or congested participant never
//!   stalls the broker
//!
//! # Modules
//!
//! - [`actors`] - Actor model implementation
//! - [`broker`] - Pairing core: matching, lifecycle, relay
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types
//! - [`observability`] - Health, stats and Prometheus endpoints
//! - [`protocol`] - WebSocket event framing
//! - [`transport`] - WebSocket upgrade and connection lifecycle

pub mod actors;
pub mod broker;
pub mod config;
pub mod errors;
pub mod observability;
pub mod protocol;
pub mod transport;
