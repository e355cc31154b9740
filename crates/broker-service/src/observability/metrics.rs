//! Metrics definitions for the pairing broker.
//!
//! All metrics follow Prometheus naming conventions:
//! - `broker_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `actor_type`: 2 values (broker, connection)
//! - `reason` (sessions ended): cancel, disconnect, skip, report, research
//! - `reason` (events dropped): bounded by `BrokerError::metric_label` plus
//!   `stale_target` and `invalid_signal`
//! - `kind`: offer, answer, ice-candidate
//! - `event`: bounded by inbound event names (~10 values)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Event handling is in-memory; anything above a few ms is a stall
        .set_buckets_for_metric(
            Matcher::Full("broker_event_latency_seconds".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250,
            ],
        )
        .map_err(|e| format!("Failed to set event latency buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Full("broker_queue_wait_seconds".to_string()),
            &[
                0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0,
            ],
        )
        .map_err(|e| format!("Failed to set queue wait buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Full("broker_pairing_duration_seconds".to_string()),
            &[
                1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0,
            ],
        )
        .map_err(|e| format!("Failed to set pairing duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Broker State (Gauges)
// ============================================================================

/// Set the number of open participant connections.
///
/// Metric: `broker_connections_active`
pub fn set_connections_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("broker_connections_active").set(count as f64);
}

/// Set the waiting queue length.
///
/// Metric: `broker_queue_depth`
pub fn set_queue_depth(depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("broker_queue_depth").set(depth as f64);
}

/// Set the number of live pairings.
///
/// Metric: `broker_pairings_active`
pub fn set_pairings_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("broker_pairings_active").set(count as f64);
}

/// Set the mailbox depth for an actor type.
///
/// Metric: `broker_actor_mailbox_depth`
/// Labels: `actor_type` (broker, connection)
pub fn set_actor_mailbox_depth(actor_type: &str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("broker_actor_mailbox_depth", "actor_type" => actor_type.to_string()).set(depth as f64);
}

// ============================================================================
// Pairing Lifecycle
// ============================================================================

/// Record a new pairing and how long the matched waiter sat in the queue.
///
/// The searcher that completes the match is not counted: it never waits.
///
/// Metrics: `broker_pairings_created_total`, `broker_queue_wait_seconds`
pub fn record_pairing_created(queue_wait: Duration) {
    counter!("broker_pairings_created_total").increment(1);
    histogram!("broker_queue_wait_seconds").record(queue_wait.as_secs_f64());
}

/// Record the end of a pairing.
///
/// Metrics: `broker_sessions_ended_total`, `broker_pairing_duration_seconds`
/// Labels: `reason` (cancel, disconnect, skip, report, research)
pub fn record_session_ended(reason: &str, duration: Duration) {
    counter!("broker_sessions_ended_total", "reason" => reason.to_string()).increment(1);
    histogram!("broker_pairing_duration_seconds").record(duration.as_secs_f64());
}

// ============================================================================
// Event Handling
// ============================================================================

/// Record a relayed signaling message.
///
/// Metric: `broker_signaling_relayed_total`
/// Labels: `kind` (offer, answer, ice-candidate)
pub fn record_signaling_relayed(kind: &str) {
    counter!("broker_signaling_relayed_total", "kind" => kind.to_string()).increment(1);
}

/// Record an inbound or outbound event that was dropped.
///
/// Metric: `broker_events_dropped_total`
/// Labels: `reason`
pub fn record_event_dropped(reason: &str) {
    counter!("broker_events_dropped_total", "reason" => reason.to_string()).increment(1);
}

/// Record how long the broker took to handle one inbound event.
///
/// Metric: `broker_event_latency_seconds`
/// Labels: `event`
pub fn record_event_latency(event: &str, duration: Duration) {
    histogram!("broker_event_latency_seconds", "event" => event.to_string())
        .record(duration.as_secs_f64());
}

// ============================================================================
// Actor Health
// ============================================================================

/// Record an actor panic event.
///
/// Metric: `broker_actor_panics_total`
/// Labels: `actor_type`
///
/// ALERT: Any non-zero value indicates a bug and should trigger investigation.
pub fn record_actor_panic(actor_type: &str) {
    counter!("broker_actor_panics_total", "actor_type" => actor_type.to_string()).increment(1);
}

/// Record messages dropped due to backpressure.
///
/// Metric: `broker_messages_dropped_total`
/// Labels: `actor_type`
pub fn record_message_dropped(actor_type: &str) {
    counter!("broker_messages_dropped_total", "actor_type" => actor_type.to_string()).increment(1);
}
