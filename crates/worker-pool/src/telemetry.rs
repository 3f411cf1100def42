// Logging setup
//
// The library only emits `tracing` events; binaries call `init_telemetry`
// once to install a subscriber.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Errors from [`init_telemetry`]
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter {filter:?}: {source}")]
    InvalidFilter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("failed to install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Log filter (e.g., "info", "worker_pool=debug")
    pub log_filter: Option<String>,
    /// Whether to enable console logging
    pub enable_console: bool,
    /// Include the event target in console output
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "worker-pool".to_string(),
            log_filter: None,
            enable_console: true,
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    /// Create a config for the given service
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Load from environment (`SERVICE_NAME`, `RUST_LOG`, then `LOG_LEVEL`)
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "worker-pool".to_string()),
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
            ..Default::default()
        }
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    pub fn with_console(mut self, enabled: bool) -> Self {
        self.enable_console = enabled;
        self
    }

    fn filter(&self) -> Result<EnvFilter, TelemetryError> {
        match &self.log_filter {
            Some(filter) => {
                EnvFilter::try_new(filter).map_err(|source| TelemetryError::InvalidFilter {
                    filter: filter.clone(),
                    source,
                })
            }
            None => Ok(EnvFilter::new("info")),
        }
    }
}

/// Install the global tracing subscriber
///
/// Fails if the filter does not parse or a subscriber is already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = config.filter()?;

    let console_layer = config.enable_console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(config.with_target)
            .with_filter(filter)
    });

    tracing_subscriber::registry().with(console_layer).try_init()?;

    tracing::info!(
        service_name = %config.service_name,
        "Telemetry initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_is_info() {
        let config = TelemetryConfig::new("test");
        assert_eq!(config.service_name, "test");
        assert!(config.filter().is_ok());
    }

    #[test]
    fn test_invalid_filter_is_reported() {
        let config = TelemetryConfig::default().with_log_filter("worker_pool=loud");
        assert!(matches!(
            config.filter(),
            Err(TelemetryError::InvalidFilter { .. })
        ));
    }
}
