//! Conversation metrics.
//!
//! Recording functions are safe to call before (or without) [`init_metrics`];
//! the `metrics` facade discards observations when no recorder is installed.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `qsprite_conversations_opened_total` | Counter | `dialect` | Conversations that completed their handshake |
//! | `qsprite_conversations_failed_total` | Counter | `dialect`, `stage` | Conversations torn down before opening |
//! | `qsprite_conversations_closed_total` | Counter | `dialect` | Open conversations that closed |
//! | `qsprite_conversations_active` | Gauge | - | Currently open conversations |
//! | `qsprite_conversation_duration_seconds` | Histogram | `dialect` | Open-to-close lifetime |
//! | `qsprite_messages_received_total` | Counter | `dialect`, `kind` | Decoded inbound messages |
//! | `qsprite_protocol_errors_total` | Counter | `dialect` | Wire protocol violations |

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

/// Conversations opened.
pub const CONVERSATIONS_OPENED: &str = "qsprite_conversations_opened_total";
/// Conversations failed before opening.
pub const CONVERSATIONS_FAILED: &str = "qsprite_conversations_failed_total";
/// Conversations closed.
pub const CONVERSATIONS_CLOSED: &str = "qsprite_conversations_closed_total";
/// Open conversations.
pub const CONVERSATIONS_ACTIVE: &str = "qsprite_conversations_active";
/// Conversation lifetime.
pub const CONVERSATION_DURATION: &str = "qsprite_conversation_duration_seconds";
/// Inbound messages.
pub const MESSAGES_RECEIVED: &str = "qsprite_messages_received_total";
/// Protocol errors.
pub const PROTOCOL_ERRORS: &str = "qsprite_protocol_errors_total";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether the Prometheus exporter is installed.
    pub enabled: bool,

    /// Address of the scrape endpoint (e.g. `"0.0.0.0:9090"`).
    pub addr: String,

    /// Histogram buckets for conversation lifetime, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:9090".to_string(),
            // 1s, 10s, 1m, 5m, 15m, 1h, 4h, 24h
            duration_buckets: vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14_400.0, 86_400.0],
        }
    }
}

/// Install the Prometheus recorder and its HTTP scrape endpoint.
///
/// # Errors
///
/// Returns `TelemetryError::BadScrapeAddress` for a bad `addr` and
/// `TelemetryError::RecorderInstall` if the recorder cannot be installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|source| TelemetryError::BadScrapeAddress {
            addr: config.addr.clone(),
            source,
        })?;

    let handle = PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(CONVERSATION_DURATION.to_string()),
            &config.duration_buckets,
        )
        .map_err(TelemetryError::BadDurationBuckets)?
        .install_recorder()
        .map_err(TelemetryError::RecorderInstall)?;

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();
    Ok(())
}

/// Render metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(
        CONVERSATIONS_OPENED,
        "Conversations that completed their handshake"
    );
    describe_counter!(
        CONVERSATIONS_FAILED,
        "Conversations torn down before opening"
    );
    describe_counter!(CONVERSATIONS_CLOSED, "Open conversations that closed");
    describe_gauge!(CONVERSATIONS_ACTIVE, "Currently open conversations");
    describe_histogram!(
        CONVERSATION_DURATION,
        "Lifetime of a conversation from open to close in seconds"
    );
    describe_counter!(MESSAGES_RECEIVED, "Decoded inbound messages");
    describe_counter!(PROTOCOL_ERRORS, "Wire protocol violations");
}

/// Stage at which a conversation failed to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// A requested service was unknown, duplicated or rejected auth.
    Binding,
    /// The dialect handshake was refused.
    Handshake,
}

impl FailureStage {
    /// Get the label value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Binding => "binding",
            Self::Handshake => "handshake",
        }
    }
}

/// Record a conversation reaching the open state.
pub fn record_conversation_opened(dialect: &'static str) {
    counter!(CONVERSATIONS_OPENED, "dialect" => dialect).increment(1);
    gauge!(CONVERSATIONS_ACTIVE).increment(1.0);
}

/// Record a conversation torn down before opening.
pub fn record_conversation_failed(dialect: &'static str, stage: FailureStage) {
    counter!(CONVERSATIONS_FAILED, "dialect" => dialect, "stage" => stage.as_str()).increment(1);
}

/// Record an open conversation closing after `lifetime`.
pub fn record_conversation_closed(dialect: &'static str, lifetime: Duration) {
    counter!(CONVERSATIONS_CLOSED, "dialect" => dialect).increment(1);
    gauge!(CONVERSATIONS_ACTIVE).decrement(1.0);
    histogram!(CONVERSATION_DURATION, "dialect" => dialect).record(lifetime.as_secs_f64());
}

/// Record an inbound message (`kind` is `text`, `binary` or `envelope`).
pub fn record_message_received(dialect: &'static str, kind: &'static str) {
    counter!(MESSAGES_RECEIVED, "dialect" => dialect, "kind" => kind).increment(1);
}

/// Record a wire protocol violation.
pub fn record_protocol_error(dialect: &'static str) {
    counter!(PROTOCOL_ERRORS, "dialect" => dialect).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.addr, "0.0.0.0:9090");
        assert!(!config.duration_buckets.is_empty());
    }

    #[test]
    fn test_disabled_metrics() {
        assert!(init_metrics(&MetricsConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_address() {
        let config = MetricsConfig {
            enabled: true,
            addr: "not-an-address".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            init_metrics(&config),
            Err(TelemetryError::BadScrapeAddress { .. })
        ));
    }

    #[test]
    fn test_record_functions_dont_panic() {
        record_conversation_opened("hybi-16");
        record_conversation_failed("legacy", FailureStage::Binding);
        record_conversation_closed("hybi-16", Duration::from_secs(3));
        record_message_received("hybi-16", "envelope");
        record_protocol_error("hybi-17");
    }

    #[test]
    fn test_failure_stage_labels() {
        assert_eq!(FailureStage::Binding.as_str(), "binding");
        assert_eq!(FailureStage::Handshake.as_str(), "handshake");
    }
}
