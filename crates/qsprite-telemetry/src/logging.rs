//! Structured logging for qsprite.
//!
//! Conversations log with a fixed set of field names (see [`fields`]) so
//! that JSON output can be filtered by token or service.
//!
//! # Example
//!
//! ```rust,ignore
//! use qsprite_telemetry::logging::{LogConfig, init_logging};
//!
//! init_logging(&LogConfig::development())?;
//!
//! tracing::info!(token = %token, dialect = "hybi-16", "conversation opened");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Filter directive (e.g. `"info"`, `"qsprite_ws=debug,info"`).
    ///
    /// `RUST_LOG` takes precedence when set and `honor_env` is true.
    pub level: String,

    /// Whether `RUST_LOG` overrides `level`.
    pub honor_env: bool,

    /// Whether to output JSON.
    pub json_format: bool,

    /// Whether to log span open/close (handshake and binding spans).
    pub span_events: bool,

    /// Whether to include file/line info.
    pub file_line_info: bool,

    /// Whether to include thread IDs.
    pub thread_ids: bool,

    /// Whether to include the module path.
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            honor_env: true,
            json_format: true,
            span_events: false,
            file_line_info: false,
            thread_ids: false,
            include_target: true,
        }
    }
}

impl LogConfig {
    /// Human-readable output at debug level.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            json_format: false,
            span_events: true,
            file_line_info: true,
            ..Self::default()
        }
    }

    /// JSON output at info level.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    fn filter(&self) -> TelemetryResult<EnvFilter> {
        if self.honor_env {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return Ok(filter);
            }
        }
        create_env_filter(&self.level)
    }
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns `TelemetryError::BadLogFilter` if the filter is invalid and
/// `TelemetryError::SubscriberInstalled` if a subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = config.filter()?;
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_span_events(span_events)
        .with_file(config.file_line_info)
        .with_line_number(config.file_line_info)
        .with_thread_ids(config.thread_ids)
        .with_target(config.include_target);

    let layer = if config.json_format {
        layer.json().with_filter(filter).boxed()
    } else {
        layer.pretty().with_filter(filter).boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(TelemetryError::SubscriberInstalled)
}

/// Parse a filter directive.
///
/// # Errors
///
/// Returns `TelemetryError::BadLogFilter` if the directive is invalid.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter)
        .map_err(|source| TelemetryError::BadLogFilter {
            directive: filter.to_string(),
            source,
        })
}

/// Field names used in conversation logs.
pub mod fields {
    /// Conversation token.
    pub const TOKEN: &str = "token";

    /// Wire dialect (`legacy`, `hybi-16`, ...).
    pub const DIALECT: &str = "dialect";

    /// Service name.
    pub const SERVICE: &str = "service";

    /// Peer address.
    pub const PEER: &str = "peer";

    /// Request origin.
    pub const ORIGIN: &str = "origin";

    /// Error description.
    pub const ERROR: &str = "error";
}
