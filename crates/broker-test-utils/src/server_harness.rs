//! Test server harness for E2E testing
//!
//! Provides `TestBrokerServer` for spawning a real broker in tests.

use broker_service::actors::{ActorMetrics, BrokerActorHandle, ConnectionSettings};
use broker_service::config::Config;
use broker_service::observability::{health_router, stats_router, HealthState};
use broker_service::transport::{ws_router, TransportState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the pairing broker in E2E tests.
///
/// The WebSocket route, `/health`, `/ready` and `/stats` share one listener.
/// `/metrics` is left out because the Prometheus recorder is process-global.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_connect() -> anyhow::Result<()> {
///     let server = TestBrokerServer::spawn().await?;
///     let client = WsTestClient::connect(&server).await?;
///     assert_eq!(server.broker().get_status().await?.connections, 1);
///     Ok(())
/// }
/// ```
pub struct TestBrokerServer {
    addr: SocketAddr,
    config: Config,
    broker: BrokerActorHandle,
    metrics: Arc<ActorMetrics>,
    health: Arc<HealthState>,
    _handle: JoinHandle<()>,
}

impl TestBrokerServer {
    /// Spawn a broker with default connection settings.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        let config = test_config()?;
        let settings = config.connection_settings();
        Self::spawn_with(config, settings).await
    }

    /// Spawn a broker with custom keepalive settings (e.g. millisecond idle timeouts).
    pub async fn spawn_with_settings(settings: ConnectionSettings) -> Result<Self, anyhow::Error> {
        Self::spawn_with(test_config()?, settings).await
    }

    async fn spawn_with(
        config: Config,
        settings: ConnectionSettings,
    ) -> Result<Self, anyhow::Error> {
        let metrics = ActorMetrics::new();
        let broker = BrokerActorHandle::new(config.broker_id.clone(), Arc::clone(&metrics));
        let health = Arc::new(HealthState::new());

        let app = ws_router(TransportState::new(
            broker.clone(),
            Arc::clone(&metrics),
            settings,
        ))
        .merge(health_router(Arc::clone(&health)))
        .merge(stats_router(broker.clone()));

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        health.set_ready();

        Ok(Self {
            addr,
            config,
            broker,
            metrics,
            health,
            _handle: handle,
        })
    }

    /// Base HTTP URL.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// WebSocket endpoint URL.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle to the running broker actor.
    pub fn broker(&self) -> &BrokerActorHandle {
        &self.broker
    }

    pub fn metrics(&self) -> &ActorMetrics {
        &self.metrics
    }

    pub fn health(&self) -> &HealthState {
        &self.health
    }
}

impl Drop for TestBrokerServer {
    fn drop(&mut self) {
        // Stop the broker actor and the HTTP server task immediately
        self.broker.cancel();
        self._handle.abort();
    }
}

fn test_config() -> Result<Config, anyhow::Error> {
    let vars = HashMap::from([
        ("BROKER_ID".to_string(), "broker-test".to_string()),
        ("BROKER_WS_BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        (
            "BROKER_HEALTH_BIND_ADDRESS".to_string(),
            "127.0.0.1:0".to_string(),
        ),
    ]);

    Config::from_vars(&vars).map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))
}
