// Logging initialization
//
// Every binary installs the same fmt subscriber. The filter comes from
// RUST_LOG (or LOG_LEVEL) and falls back to a per-binary default.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name, logged once at startup
    pub service_name: String,
    /// Whether to enable console logging
    pub enable_console: bool,
    /// Log filter (e.g., "info", "pulseboard_worker=debug")
    pub log_filter: Option<String>,
    /// Filter used when none is configured
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "pulseboard".to_string(),
            enable_console: true,
            log_filter: None,
            default_filter: "info".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `RUST_LOG` or `LOG_LEVEL`: Log filter
    pub fn from_env(service_name: &str, default_filter: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            enable_console: true,
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
            default_filter: default_filter.to_string(),
        }
    }

    fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new(&self.default_filter))
    }
}

/// Install the global subscriber. Calling it twice is harmless; the second
/// call leaves the first subscriber in place.
pub fn init_telemetry(config: TelemetryConfig) {
    let console_layer = if config.enable_console {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(config.filter()),
        )
    } else {
        None
    };

    if tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .is_ok()
    {
        tracing::debug!(service = %config.service_name, "Logging initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_falls_back_to_default() {
        let config = TelemetryConfig {
            log_filter: None,
            default_filter: "warn".to_string(),
            ..Default::default()
        };
        assert_eq!(config.filter().to_string(), "warn");
    }

    #[test]
    fn test_configured_filter_wins() {
        let config = TelemetryConfig {
            log_filter: Some("pulseboard_worker=debug".to_string()),
            ..Default::default()
        };
        assert_eq!(config.filter().to_string(), "pulseboard_worker=debug");
    }
}
