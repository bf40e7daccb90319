//! # ebeast Telemetry
//!
//! Logging setup shared by the probe and the integration tests.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ebeast_telemetry::{init_tracing, TelemetryConfig};
//!
//! fn main() {
//!     init_tracing(&TelemetryConfig::from_env()).expect("Failed to init tracing");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `EBEAST_SERVICE_NAME` | `ebeast` | Service name attached to the startup event |
//! | `EBEAST_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `EBEAST_JSON_LOGS` | `false` | One JSON object per event |
//! | `EBEAST_LOG_ANSI` | `true` | Colored pretty output |

mod config;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use tracing_setup::{init_tracing, try_init_for_tests};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Failed to install subscriber: {0}")]
    SubscriberInit(String),
}
