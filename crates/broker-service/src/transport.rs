//! WebSocket transport.
//!
//! `GET /ws` upgrades to a WebSocket and hands the socket to a new
//! [`ConnectionActor`]. The transport owns the connection's lifecycle:
//!
//! 1. Assign a fresh [`ParticipantId`]
//! 2. Register the connection's handle with the broker (refused while draining)
//! 3. Run the actor on its own task until the socket ends
//! 4. Report the disconnect so the broker tears the participant down

use crate::actors::{
    ActorMetrics, ActorType, BrokerActorHandle, ConnectionActor, ConnectionSettings,
};

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use common::types::ParticipantId;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Shared state for the WebSocket router.
#[derive(Clone, Debug)]
pub struct TransportState {
    broker: BrokerActorHandle,
    metrics: Arc<ActorMetrics>,
    settings: ConnectionSettings,
}

impl TransportState {
    #[must_use]
    pub fn new(
        broker: BrokerActorHandle,
        metrics: Arc<ActorMetrics>,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            broker,
            metrics,
            settings,
        }
    }
}

/// Build the WebSocket router (`GET /ws`).
pub fn ws_router(state: TransportState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<TransportState>) -> Response {
    if state.broker.is_cancelled() {
        debug!(target: "broker.transport", "Refusing upgrade while draining");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    ws.on_upgrade(move |socket| serve_connection(socket, state))
}

/// Drive one accepted WebSocket from registration to disconnect.
async fn serve_connection(socket: WebSocket, state: TransportState) {
    let participant_id = ParticipantId::new();
    let (actor, handle) = ConnectionActor::new(
        participant_id,
        socket,
        state.broker.clone(),
        state.broker.child_token(),
        state.settings,
    );

    // Registration happens before the actor reads its first frame.
    if let Err(e) = state.broker.connect(Arc::new(handle)).await {
        warn!(
            target: "broker.transport",
            participant_id = %participant_id,
            error = %e,
            "Connection refused"
        );
        return;
    }

    state.metrics.connection_created();
    info!(
        target: "broker.transport",
        participant_id = %participant_id,
        connections = state.metrics.connection_count(),
        "Participant connected"
    );

    let task = tokio::spawn(actor.run());
    if let Err(e) = task.await {
        if e.is_panic() {
            state.metrics.record_panic(ActorType::Connection);
        } else {
            debug!(
                target: "broker.transport",
                participant_id = %participant_id,
                error = %e,
                "Connection task cancelled"
            );
        }
    }

    state.metrics.connection_closed();

    // The broker may already be gone during shutdown; nothing left to tear down.
    if let Err(e) = state.broker.disconnect(participant_id).await {
        debug!(
            target: "broker.transport",
            participant_id = %participant_id,
            error = %e,
            "Disconnect not delivered"
        );
    }

    info!(
        target: "broker.transport",
        participant_id = %participant_id,
        connections = state.metrics.connection_count(),
        "Participant disconnected"
    );
}
