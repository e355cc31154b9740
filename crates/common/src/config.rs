//! Common configuration types for Tandem components.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Output format for structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Text,
    /// One JSON object per event (for log shipping).
    Json,
}

/// Error returned for an unknown `LOG_FORMAT` value.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown log format: {0}")]
pub struct UnknownLogFormat(pub String);

impl FromStr for LogFormat {
    type Err = UnknownLogFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(UnknownLogFormat(other.to_string())),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log filter directive used when `RUST_LOG` is not set.
    pub default_filter: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl ObservabilityConfig {
    /// Read `LOG_FORMAT` from the given variables, falling back to text output.
    pub fn from_vars(
        vars: &HashMap<String, String>,
        default_filter: impl Into<String>,
    ) -> Result<Self, UnknownLogFormat> {
        let log_format = match vars.get("LOG_FORMAT") {
            Some(value) => value.parse()?,
            None => LogFormat::default(),
        };

        Ok(Self {
            default_filter: default_filter.into(),
            log_format,
        })
    }

    /// Build the env filter: `RUST_LOG` wins, otherwise the default directive.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }

    /// Install the global tracing subscriber.
    ///
    /// Returns an error if a global subscriber was already installed.
    pub fn init_tracing(&self) -> Result<(), tracing_subscriber::util::TryInitError> {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let registry = tracing_subscriber::registry().with(self.env_filter());
        match self.log_format {
            LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
            LogFormat::Json => registry
                .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
                .try_init(),
        }
    }
}
