//! Pairing broker configuration.
//!
//! Configuration is loaded from environment variables. Every setting has a
//! default, so an empty environment yields a runnable local broker.

use crate::actors::ConnectionSettings;
use common::config::{LogFormat, ObservabilityConfig};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default WebSocket bind address.
pub const DEFAULT_WS_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default keepalive ping period in seconds.
pub const DEFAULT_PING_INTERVAL_SECONDS: u64 = 25;

/// Default idle timeout in seconds (no inbound frame for this long closes the socket).
pub const DEFAULT_IDLE_TIMEOUT_SECONDS: u64 = 60;

/// Default per-connection outbound mailbox capacity.
pub const DEFAULT_CONNECTION_MAILBOX: usize = 256;

/// Default drain time on shutdown in seconds.
pub const DEFAULT_SHUTDOWN_GRACE_SECONDS: u64 = 5;

/// Default broker instance ID prefix.
pub const DEFAULT_BROKER_ID_PREFIX: &str = "broker";

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "broker_service=info,tower_http=info";

/// Pairing broker configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for this broker instance.
    pub broker_id: String,

    /// WebSocket server bind address (default: "0.0.0.0:3000").
    pub ws_bind_address: String,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Keepalive ping period.
    pub ping_interval: Duration,

    /// Close a connection after this long without any inbound frame.
    pub idle_timeout: Duration,

    /// Per-connection outbound mailbox capacity.
    pub connection_mailbox: usize,

    /// Drain time on shutdown.
    pub shutdown_grace: Duration,

    /// Logging configuration.
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let ws_bind_address = vars
            .get("BROKER_WS_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_WS_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("BROKER_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let ping_interval = Duration::from_secs(parse_or(
            vars,
            "BROKER_PING_INTERVAL_SECONDS",
            DEFAULT_PING_INTERVAL_SECONDS,
        )?);

        let idle_timeout = Duration::from_secs(parse_or(
            vars,
            "BROKER_IDLE_TIMEOUT_SECONDS",
            DEFAULT_IDLE_TIMEOUT_SECONDS,
        )?);

        let connection_mailbox =
            parse_or(vars, "BROKER_CONNECTION_MAILBOX", DEFAULT_CONNECTION_MAILBOX)?;

        let shutdown_grace = Duration::from_secs(parse_or(
            vars,
            "BROKER_SHUTDOWN_GRACE_SECONDS",
            DEFAULT_SHUTDOWN_GRACE_SECONDS,
        )?);

        if ping_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "BROKER_PING_INTERVAL_SECONDS must be greater than zero".to_string(),
            ));
        }

        if idle_timeout < ping_interval {
            return Err(ConfigError::InvalidValue(
                "BROKER_IDLE_TIMEOUT_SECONDS must not be shorter than the ping interval"
                    .to_string(),
            ));
        }

        if connection_mailbox == 0 {
            return Err(ConfigError::InvalidValue(
                "BROKER_CONNECTION_MAILBOX must be greater than zero".to_string(),
            ));
        }

        let observability = ObservabilityConfig::from_vars(vars, DEFAULT_LOG_FILTER)
            .map_err(|e| ConfigError::InvalidValue(format!("LOG_FORMAT: {e}")))?;

        // Generate broker instance ID
        let broker_id = vars.get("BROKER_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().simple().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_BROKER_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            broker_id,
            ws_bind_address,
            health_bind_address,
            ping_interval,
            idle_timeout,
            connection_mailbox,
            shutdown_grace,
            observability,
        })
    }

    /// Whether logs are emitted as JSON.
    #[must_use]
    pub fn json_logs(&self) -> bool {
        self.observability.log_format == LogFormat::Json
    }

    /// Keepalive and buffering settings handed to every connection actor.
    #[must_use]
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            ping_interval: self.ping_interval,
            idle_timeout: self.idle_timeout,
            mailbox: self.connection_mailbox,
        }
    }
}

fn parse_or<T: FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load successfully");

        assert_eq!(config.ws_bind_address, DEFAULT_WS_BIND_ADDRESS);
        assert_eq!(config.health_bind_address, DEFAULT_HEALTH_BIND_ADDRESS);
        assert_eq!(
            config.ping_interval,
            Duration::from_secs(DEFAULT_PING_INTERVAL_SECONDS)
        );
        assert_eq!(
            config.idle_timeout,
            Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECONDS)
        );
        assert_eq!(config.connection_mailbox, DEFAULT_CONNECTION_MAILBOX);
        assert_eq!(
            config.shutdown_grace,
            Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECONDS)
        );
        assert!(!config.json_logs());
        // Broker ID should be auto-generated
        assert!(config.broker_id.starts_with("broker-"));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let vars = HashMap::from([
            ("BROKER_ID".to_string(), "broker-custom-001".to_string()),
            (
                "BROKER_WS_BIND_ADDRESS".to_string(),
                "127.0.0.1:4000".to_string(),
            ),
            (
                "BROKER_HEALTH_BIND_ADDRESS".to_string(),
                "127.0.0.1:8082".to_string(),
            ),
            ("BROKER_PING_INTERVAL_SECONDS".to_string(), "10".to_string()),
            ("BROKER_IDLE_TIMEOUT_SECONDS".to_string(), "30".to_string()),
            ("BROKER_CONNECTION_MAILBOX".to_string(), "64".to_string()),
            ("BROKER_SHUTDOWN_GRACE_SECONDS".to_string(), "1".to_string()),
            ("LOG_FORMAT".to_string(), "json".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.broker_id, "broker-custom-001");
        assert_eq!(config.ws_bind_address, "127.0.0.1:4000");
        assert_eq!(config.health_bind_address, "127.0.0.1:8082");
        assert_eq!(config.ping_interval, Duration::from_secs(10));
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.connection_mailbox, 64);
        assert_eq!(config.shutdown_grace, Duration::from_secs(1));
        assert!(config.json_logs());

        let settings = config.connection_settings();
        assert_eq!(settings.ping_interval, Duration::from_secs(10));
        assert_eq!(settings.idle_timeout, Duration::from_secs(30));
        assert_eq!(settings.mailbox, 64);
    }

    #[test]
    fn test_from_vars_rejects_unparseable_number() {
        let vars = HashMap::from([(
            "BROKER_PING_INTERVAL_SECONDS".to_string(),
            "soon".to_string(),
        )]);

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue(v)) if v.contains("BROKER_PING_INTERVAL_SECONDS"))
        );
    }

    #[test]
    fn test_from_vars_rejects_zero_ping_interval() {
        let vars = HashMap::from([("BROKER_PING_INTERVAL_SECONDS".to_string(), "0".to_string())]);
        assert!(Config::from_vars(&vars).is_err());
    }

    #[test]
    fn test_from_vars_rejects_idle_timeout_below_ping_interval() {
        let vars = HashMap::from([
            ("BROKER_PING_INTERVAL_SECONDS".to_string(), "30".to_string()),
            ("BROKER_IDLE_TIMEOUT_SECONDS".to_string(), "10".to_string()),
        ]);
        assert!(Config::from_vars(&vars).is_err());
    }

    #[test]
    fn test_from_vars_rejects_zero_mailbox() {
        let vars = HashMap::from([("BROKER_CONNECTION_MAILBOX".to_string(), "0".to_string())]);
        assert!(Config::from_vars(&vars).is_err());
    }

    #[test]
    fn test_from_vars_rejects_unknown_log_format() {
        let vars = HashMap::from([("LOG_FORMAT".to_string(), "xml".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(v)) if v.starts_with("LOG_FORMAT")));
    }
}
