//! Observability for the pairing broker.
//!
//! # Privacy by Default
//!
//! Participants are anonymous, but their ids still never appear in metric
//! labels. Labels are bounded to prevent cardinality explosion:
//! - `reason`: session end reasons and drop reasons, bounded by code
//! - `kind`: the three signaling kinds
//! - `event`: client event names
//! - `actor_type`: 2 values (broker, connection)
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `broker_connections_active` | Gauge | none | Open WebSocket connections |
//! | `broker_queue_depth` | Gauge | none | Participants waiting for a match |
//! | `broker_pairings_active` | Gauge | none | Live pairings |
//! | `broker_pairings_created_total` | Counter | none | Matches made |
//! | `broker_sessions_ended_total` | Counter | `reason` | Pairings dissolved |
//! | `broker_signaling_relayed_total` | Counter | `kind` | Offers, answers and candidates delivered |
//! | `broker_events_dropped_total` | Counter | `reason` | Events ignored or undeliverable |
//! | `broker_actor_panics_total` | Counter | `actor_type` | Actor panics |
//! | `broker_messages_dropped_total` | Counter | `actor_type` | Mailbox backpressure drops |
//! | `broker_queue_wait_seconds` | Histogram | none | Time the matched waiter spent queued |
//! | `broker_pairing_duration_seconds` | Histogram | none | Pairing lifetime |
//! | `broker_event_latency_seconds` | Histogram | `event` | Broker-side event handling latency |

pub mod health;
pub mod metrics;

// Re-exports for convenience
pub use health::{health_router, metrics_router, stats_router, HealthState};
pub use metrics::init_metrics_recorder;
