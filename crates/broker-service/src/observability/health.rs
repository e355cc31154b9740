//! Operational HTTP endpoints for the pairing broker.
//!
//! Served on the health listener, separate from the WebSocket listener:
//! - `GET /health` - Liveness probe (is the process running?)
//! - `GET /ready` - Readiness probe (is the WebSocket listener accepting?)
//! - `GET /stats` - Current broker counts as JSON
//! - `GET /metrics` - Prometheus text format
//!
//! Liveness is unconditional: if the process can answer, it is live.
//! Readiness is a single flag flipped by `main` once the WebSocket listener
//! is bound, and cleared again when draining starts.

use crate::actors::BrokerActorHandle;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Readiness flag shared between `main` and the `/ready` handler.
#[derive(Debug, Default)]
pub struct HealthState {
    ready: AtomicBool,
}

impl HealthState {
    /// Starts not ready.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Stop advertising readiness, e.g. when draining.
    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Create the health router with liveness and readiness endpoints.
///
/// - `GET /health` - always 200
/// - `GET /ready` - 200 while ready, 503 otherwise
pub fn health_router(health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .with_state(health_state)
}

/// Create the stats router.
///
/// `GET /stats` asks the broker actor for a [`BrokerStatus`] snapshot and
/// returns it as JSON, or 503 once the actor has stopped.
///
/// [`BrokerStatus`]: crate::broker::BrokerStatus
pub fn stats_router(broker: BrokerActorHandle) -> Router {
    Router::new()
        .route("/stats", get(stats_handler))
        .with_state(broker)
}

/// Create the Prometheus scrape router.
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(handle)
}

async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe handler.
///
/// Returns 503 before the WebSocket listener is bound and while draining.
async fn readiness_handler(State(state): State<Arc<HealthState>>) -> StatusCode {
    if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[tracing::instrument(skip_all, name = "broker.stats")]
async fn stats_handler(State(broker): State<BrokerActorHandle>) -> axum::response::Response {
    match broker.get_status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => {
            warn!(target: "broker.transport", error = %e, "Stats unavailable");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// Returns Prometheus-formatted metrics for scraping.
#[tracing::instrument(skip_all, name = "broker.metrics.scrape")]
async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::ActorMetrics;
    use crate::broker::BrokerStatus;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::util::ServiceExt;

    async fn get(app: Router, uri: &str) -> axum::response::Response {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("Failed to build request");

        app.oneshot(request)
            .await
            .expect("Failed to execute request")
    }

    #[tokio::test]
    async fn test_readiness_follows_startup_and_drain() {
        let state = Arc::new(HealthState::new());
        let app = health_router(Arc::clone(&state));

        assert_eq!(get(app.clone(), "/ready").await.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.set_ready();
        assert_eq!(get(app.clone(), "/ready").await.status(), StatusCode::OK);

        // Draining: /ready fails while /health keeps answering
        state.set_not_ready();
        assert_eq!(get(app.clone(), "/ready").await.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(get(app.clone(), "/health").await.status(), StatusCode::OK);
        assert_eq!(get(app, "/unknown").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_renders_broker_gauges() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        ::metrics::with_local_recorder(&recorder, || {
            crate::observability::metrics::set_queue_depth(3);
        });

        let response = get(metrics_router(handle), "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("broker_queue_depth 3"), "{text}");
    }

    #[tokio::test]
    async fn test_stats_endpoint_returns_broker_status() {
        let broker = BrokerActorHandle::new("broker-stats".to_string(), ActorMetrics::new());
        let app = stats_router(broker.clone());

        let response = get(app, "/stats").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let status: BrokerStatus = serde_json::from_slice(&body).unwrap();
        assert_eq!(status.connections, 0);
        assert_eq!(status.queue_depth, 0);
        assert_eq!(status.pairings_active, 0);

        broker.cancel();
    }

    #[tokio::test]
    async fn test_stats_endpoint_unavailable_after_broker_stops() {
        let (broker, task) = BrokerActorHandle::spawn("broker-gone".to_string(), ActorMetrics::new());
        broker.cancel();
        task.await.unwrap();

        let response = get(stats_router(broker), "/stats").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
