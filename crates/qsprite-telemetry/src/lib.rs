//! Logging and metrics for qsprite.
//!
//! - **Logging**: `tracing-subscriber` with an `EnvFilter` and JSON or
//!   pretty output
//! - **Metrics**: conversation counters through the `metrics` facade, with
//!   an optional Prometheus scrape endpoint
//!
//! # Example
//!
//! ```rust,ignore
//! use qsprite_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::builder()
//!     .log_level("qsprite_ws=debug,info")
//!     .metrics_addr("0.0.0.0:9090")
//!     .build();
//! init_telemetry(&config)?;
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use metrics::{init_metrics, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initialize logging, then metrics.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_disabled() {
        let config = TelemetryConfig {
            logging: LogConfig {
                enabled: false,
                ..LogConfig::default()
            },
            metrics: MetricsConfig::default(),
        };
        assert!(init_telemetry(&config).is_ok());
    }
}
