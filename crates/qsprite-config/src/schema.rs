//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use std::time::Duration;

use qsprite_telemetry::{LogConfig, MetricsConfig, TelemetryConfig};
use qsprite_ws::ConversationConfig;
use serde::{Deserialize, Serialize};

/// Listener configuration section.
///
/// # Example
///
/// ```
/// use qsprite_config::ServerConfig;
///
/// let config = ServerConfig {
///     listen_addr: "127.0.0.1:8080".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(config.keepalive_secs, 50);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Listener bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Largest accepted upgrade request head in bytes.
    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,

    /// Time allowed to receive the upgrade request head, in milliseconds.
    #[serde(default = "default_header_timeout")]
    pub header_timeout_ms: u64,

    /// TCP keepalive interval in seconds. 0 disables keepalive.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_connections: default_max_connections(),
            max_header_bytes: default_max_header_bytes(),
            header_timeout_ms: default_header_timeout(),
            keepalive_secs: default_keepalive(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    10000
}

fn default_max_header_bytes() -> usize {
    16 * 1024
}

fn default_header_timeout() -> u64 {
    10_000
}

fn default_keepalive() -> u64 {
    50
}

/// Conversation configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConversationSection {
    /// Allowed origins as `host:port` patterns; `*` matches any part.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Largest frame or reassembled message in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Time the legacy handshake waits for its nonce, in milliseconds.
    #[serde(default = "default_nonce_timeout")]
    pub nonce_timeout_ms: u64,

    /// Capacity of each conversation's event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Socket read buffer size in bytes.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

impl Default for ConversationSection {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            max_message_size: default_max_message_size(),
            nonce_timeout_ms: default_nonce_timeout(),
            event_capacity: default_event_capacity(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

impl ConversationSection {
    /// Convert to the runtime conversation configuration.
    pub fn to_conversation_config(&self, keepalive: Duration) -> ConversationConfig {
        ConversationConfig::new()
            .allowed_origins(self.allowed_origins.iter().cloned())
            .max_message_size(self.max_message_size)
            .nonce_timeout(Duration::from_millis(self.nonce_timeout_ms))
            .keepalive_interval(keepalive)
            .event_capacity(self.event_capacity)
            .read_buffer_size(self.read_buffer_size)
    }
}

fn default_allowed_origins() -> Vec<String> {
    vec![qsprite_ws::ANY_ORIGIN.to_string()]
}

fn default_max_message_size() -> usize {
    64 * 1024 * 1024
}

fn default_nonce_timeout() -> u64 {
    5000
}

fn default_event_capacity() -> usize {
    64
}

fn default_read_buffer_size() -> usize {
    16 * 1024
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    /// Enable the Prometheus exporter.
    #[serde(default)]
    pub enabled: bool,

    /// Prometheus metrics endpoint address.
    #[serde(default = "default_metrics_addr")]
    pub addr: String,

    /// Histogram bucket boundaries for conversation lifetime, in seconds.
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_metrics_addr(),
            duration_buckets: default_duration_buckets(),
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_duration_buckets() -> Vec<f64> {
    MetricsConfig::default().duration_buckets
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (for production).
    #[default]
    Json,
    /// Human-readable format (for development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive (trace, debug, info, warn, error, or per-target).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include source file and line in log output.
    #[serde(default)]
    pub include_location: bool,

    /// Log span open and close events.
    #[serde(default)]
    pub span_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::Json,
            include_location: false,
            span_events: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Telemetry configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsSection,
}

impl TelemetrySection {
    /// Convert to the runtime telemetry configuration.
    pub fn to_telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig::builder()
            .logging(LogConfig {
                enabled: self.logging.enabled,
                level: self.logging.level.clone(),
                json_format: self.logging.format == LogFormat::Json,
                span_events: self.logging.span_events,
                file_line_info: self.logging.include_location,
                ..LogConfig::default()
            })
            .metrics(MetricsConfig {
                enabled: self.metrics.enabled,
                addr: self.metrics.addr.clone(),
                duration_buckets: self.metrics.duration_buckets.clone(),
            })
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.keepalive_secs, 50);
        assert_eq!(config.max_header_bytes, 16 * 1024);
    }

    #[test]
    fn test_conversation_section_conversion() {
        let section = ConversationSection {
            allowed_origins: vec!["example.com:443".to_string()],
            nonce_timeout_ms: 250,
            ..Default::default()
        };
        let config = section.to_conversation_config(Duration::from_secs(50));
        assert_eq!(config.allowed_origins, vec!["example.com:443".to_string()]);
        assert_eq!(config.nonce_timeout, Duration::from_millis(250));
        assert_eq!(config.keepalive_interval, Duration::from_secs(50));
        assert_eq!(config.max_message_size, 64 * 1024 * 1024);
    }

    #[test]
    fn test_telemetry_conversion() {
        let section = TelemetrySection {
            logging: LoggingConfig {
                format: LogFormat::Pretty,
                level: "debug".to_string(),
                ..Default::default()
            },
            metrics: MetricsSection {
                enabled: true,
                ..Default::default()
            },
        };
        let config = section.to_telemetry_config();
        assert!(!config.logging.json_format);
        assert_eq!(config.logging.level, "debug");
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_log_format_serde() {
        let json = serde_json::to_string(&LogFormat::Pretty).unwrap();
        assert_eq!(json, "\"pretty\"");
        let format: LogFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(format, LogFormat::Json);
    }
}
