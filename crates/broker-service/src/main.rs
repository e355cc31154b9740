//! Tandem Pairing Broker
//!
//! Matches anonymous participants into 1:1 video sessions and relays their
//! WebRTC signaling.
//!
//! # Servers
//!
//! The broker runs two listeners:
//! - WebSocket server for participants (default: 0.0.0.0:3000, path `/ws`)
//! - HTTP server for health, stats and metrics (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing
//! 3. Initialize Prometheus metrics recorder
//! 4. Initialize actor system (`BrokerActorHandle`)
//! 5. Start health HTTP server (liveness, readiness, stats, metrics)
//! 6. Start WebSocket server and mark ready
//! 7. Wait for shutdown signal, then drain

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;

use broker_service::actors::{ActorMetrics, BrokerActorHandle};
use broker_service::config::Config;
use broker_service::errors::BrokerError;
use broker_service::observability::{
    health_router, init_metrics_recorder, metrics_router, stats_router, HealthState,
};
use broker_service::transport::{ws_router, TransportState};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration before tracing so LOG_FORMAT applies from the first line
    let config = Config::from_env().map_err(|e| {
        let e = BrokerError::from(e);
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    config
        .observability
        .init_tracing()
        .map_err(|e| format!("Failed to initialize tracing: {e}"))?;

    info!("Starting Tandem pairing broker");
    info!(
        broker_id = %config.broker_id,
        ws_bind_address = %config.ws_bind_address,
        health_bind_address = %config.health_bind_address,
        ping_interval_secs = config.ping_interval.as_secs(),
        idle_timeout_secs = config.idle_timeout.as_secs(),
        connection_mailbox = config.connection_mailbox,
        json_logs = config.json_logs(),
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new());

    info!("Initializing actor system...");
    let actor_metrics = ActorMetrics::new();
    let broker = BrokerActorHandle::new(config.broker_id.clone(), Arc::clone(&actor_metrics));
    info!("Actor system initialized");

    // HTTP servers outlive the broker's root token so /stats and probes keep
    // answering while connections drain.
    let server_token = CancellationToken::new();

    // Start health HTTP server (MUST succeed - fail startup if it doesn't)
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let health_app = health_router(Arc::clone(&health_state))
        .merge(stats_router(broker.clone()))
        .merge(metrics_router(prometheus_handle));

    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;
    info!(addr = %health_addr, "Health server bound successfully");

    let health_task = spawn_server(
        "Health",
        health_listener,
        health_app,
        server_token.child_token(),
    );

    // Start WebSocket server
    let ws_addr: SocketAddr = config.ws_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.ws_bind_address, "Invalid WebSocket bind address");
        format!("Invalid WebSocket bind address: {e}")
    })?;

    let ws_app = ws_router(TransportState::new(
        broker.clone(),
        Arc::clone(&actor_metrics),
        config.connection_settings(),
    ));

    let ws_listener = tokio::net::TcpListener::bind(ws_addr).await.map_err(|e| {
        error!(error = %e, addr = %ws_addr, "Failed to bind WebSocket server");
        format!("Failed to bind WebSocket server to {ws_addr}: {e}")
    })?;
    info!(addr = %ws_addr, "WebSocket server bound successfully");

    let ws_task = spawn_server("WebSocket", ws_listener, ws_app, server_token.child_token());

    health_state.set_ready();
    info!("Pairing broker running - press Ctrl+C to shutdown");

    shutdown_signal().await;
    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so k8s stops sending traffic
    health_state.set_not_ready();

    // Refuses new connections and closes every open socket
    if let Err(e) = broker.shutdown().await {
        warn!(error = %e, "Actor system shutdown error");
    }

    if actor_metrics.wait_drained(config.shutdown_grace).await {
        info!("All connections drained");
    } else {
        warn!(
            remaining = actor_metrics.connection_count(),
            grace_secs = config.shutdown_grace.as_secs(),
            "Shutdown grace elapsed with connections still open"
        );
    }

    server_token.cancel();
    for task in [ws_task, health_task] {
        if let Err(e) = task.await {
            warn!(error = %e, "Server task ended abnormally");
        }
    }

    info!("Pairing broker shutdown complete");
    Ok(())
}

/// Serve `app` on `listener` until `shutdown` is cancelled.
fn spawn_server(
    name: &'static str,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(server = name, "Server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!(server = name, "Server shutting down");
        });
        if let Err(e) = server.await {
            error!(server = name, error = %e, "Server failed");
        }
    })
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
