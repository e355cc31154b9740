//! # Broker Test Utilities
//!
//! Shared test utilities for the pairing broker.
//!
//! This crate provides:
//! - `RecordingSink` - in-memory [`EventSink`] for driving the broker core directly
//! - `assertions` - invariant and state checks over a [`Broker`]
//! - `TestBrokerServer` - the real WebSocket and stats routers on a random port
//! - `WsTestClient` - a participant speaking the JSON event protocol
//!
//! ## Usage
//!
//! ```rust,ignore
//! use broker_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let server = TestBrokerServer::spawn().await?;
//!     let mut alice = WsTestClient::connect(&server).await?;
//!     let mut bob = WsTestClient::connect(&server).await?;
//!
//!     alice.search().await?;
//!     bob.search().await?;
//!
//!     let found = alice.expect_found().await?;
//!     assert_eq!(found.peer_id, bob.participant_id());
//!     Ok(())
//! }
//! ```
//!
//! [`EventSink`]: broker_service::broker::EventSink
//! [`Broker`]: broker_service::broker::Broker

pub mod assertions;
pub mod recording_sink;
pub mod server_harness;
pub mod ws_client;

// Re-export commonly used items
pub use assertions::*;
pub use recording_sink::*;
pub use server_harness::*;
pub use ws_client::*;
