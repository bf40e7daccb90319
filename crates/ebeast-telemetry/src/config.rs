//! Telemetry configuration from environment variables.

use std::env;

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name reported at startup
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or full directives
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Whether pretty output uses ANSI colors
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "ebeast".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            ansi: true,
        }
    }
}

fn flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `EBEAST_SERVICE_NAME`: Service name (default: ebeast)
    /// - `EBEAST_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `EBEAST_JSON_LOGS`: Enable JSON logs (default: false)
    /// - `EBEAST_LOG_ANSI`: Colored output (default: true)
    pub fn from_env() -> Self {
        Self {
            service_name: env::var("EBEAST_SERVICE_NAME").unwrap_or_else(|_| "ebeast".to_string()),

            log_level: env::var("EBEAST_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            json_logs: env::var("EBEAST_JSON_LOGS")
                .map(|v| flag(&v))
                .unwrap_or(false),

            ansi: env::var("EBEAST_LOG_ANSI")
                .map(|v| !(v.eq_ignore_ascii_case("false") || v == "0"))
                .unwrap_or(true),
        }
    }

    /// Configuration for a named tool, verbosity from the command line.
    pub fn for_tool(name: &str, log_level: &str) -> Self {
        Self {
            service_name: name.to_string(),
            log_level: log_level.to_string(),
            ..Self::from_env()
        }
    }
}
