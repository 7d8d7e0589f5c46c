//! Errors from installing the global subscriber and the metrics recorder.

use std::net::AddrParseError;

use metrics_exporter_prometheus::BuildError;
use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::TryInitError;

/// Why telemetry could not be installed.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The log level or filter directive does not parse.
    #[error("bad log filter `{directive}`")]
    BadLogFilter {
        /// The rejected directive.
        directive: String,
        /// Parser error.
        #[source]
        source: ParseError,
    },

    /// Another global tracing subscriber is already installed.
    #[error("a global tracing subscriber is already installed")]
    SubscriberInstalled(#[source] TryInitError),

    /// The Prometheus scrape address does not parse.
    #[error("bad metrics scrape address `{addr}`")]
    BadScrapeAddress {
        /// The rejected address.
        addr: String,
        /// Parser error.
        #[source]
        source: AddrParseError,
    },

    /// The conversation duration buckets were rejected.
    #[error("bad conversation duration buckets")]
    BadDurationBuckets(#[source] BuildError),

    /// The Prometheus recorder or its scrape listener could not be installed.
    #[error("failed to install the Prometheus recorder")]
    RecorderInstall(#[source] BuildError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrape_address_error() {
        let source = "x:y".parse::<std::net::SocketAddr>().unwrap_err();
        let err = TelemetryError::BadScrapeAddress {
            addr: "x:y".to_string(),
            source,
        };
        assert_eq!(err.to_string(), "bad metrics scrape address `x:y`");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_log_filter_error() {
        let source = tracing_subscriber::EnvFilter::try_new("qsprite=loud").unwrap_err();
        let err = TelemetryError::BadLogFilter {
            directive: "qsprite=loud".to_string(),
            source,
        };
        assert!(err.to_string().contains("qsprite=loud"));
    }
}
