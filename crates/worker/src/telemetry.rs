// Tracing initialisation for the worker process
//
// Console logging through tracing-subscriber with an EnvFilter, as plain text
// or one JSON object per line.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Configuration for logging
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Log filter (e.g., "info", "debug", "courier_outbox=debug")
    pub log_filter: Option<String>,
    /// Output format
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: None,
            format: LogFormat::Text,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `RUST_LOG` or `LOG_LEVEL`: Log filter
    /// - `LOG_FORMAT`: "json" for structured output (default: text)
    pub fn from_env() -> Self {
        Self::from_values(
            std::env::var("RUST_LOG").ok(),
            std::env::var("LOG_LEVEL").ok(),
            std::env::var("LOG_FORMAT").ok(),
        )
    }

    fn from_values(
        rust_log: Option<String>,
        log_level: Option<String>,
        log_format: Option<String>,
    ) -> Self {
        let log_filter = rust_log.or_else(|| {
            // A bare level applies to the courier crates only
            log_level.map(|level| format!("courier_outbox={level},courier_worker={level}"))
        });
        let format = match log_format.map(|v| v.to_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };
        Self { log_filter, format }
    }

    fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }
}

/// Install the global tracing subscriber
///
/// # Example
///
/// ```ignore
/// use courier_worker::telemetry::{init_telemetry, TelemetryConfig};
///
/// #[tokio::main]
/// async fn main() {
///     init_telemetry(&TelemetryConfig::from_env());
///     // ... your application code
/// }
/// ```
pub fn init_telemetry(config: &TelemetryConfig) {
    let (text_layer, json_layer) = match config.format {
        LogFormat::Text => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_filter(config.filter()),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_filter(config.filter()),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(text_layer)
        .with(json_layer)
        .init();

    tracing::debug!(format = ?config.format, "Logging initialised");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_takes_precedence() {
        let config = TelemetryConfig::from_values(
            Some("warn,courier_outbox=trace".to_string()),
            Some("debug".to_string()),
            None,
        );
        assert_eq!(config.log_filter.as_deref(), Some("warn,courier_outbox=trace"));
        assert_eq!(config.format, LogFormat::Text);
    }

    #[test]
    fn test_log_level_scopes_courier_crates() {
        let config = TelemetryConfig::from_values(None, Some("debug".to_string()), None);
        assert_eq!(
            config.log_filter.as_deref(),
            Some("courier_outbox=debug,courier_worker=debug")
        );
    }

    #[test]
    fn test_json_format() {
        let config = TelemetryConfig::from_values(None, None, Some("JSON".to_string()));
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.log_filter.is_none());
    }

    #[test]
    fn test_invalid_filter_falls_back_to_info() {
        let config = TelemetryConfig {
            log_filter: Some("courier_outbox=loudest".to_string()),
            format: LogFormat::Text,
        };
        assert_eq!(config.filter().to_string(), "info");
    }
}
