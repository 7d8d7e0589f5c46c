//! Error types for the upgrade listener.

use std::io;

use http::StatusCode;
use qsprite_config::ConfigError;
use qsprite_ws::WsError;
use thiserror::Error;

/// Errors raised by the upgrade listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be parsed.
    #[error("invalid listen address '{addr}': {reason}")]
    InvalidAddress {
        /// The configured address.
        addr: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address we tried to bind.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The request head grew past the configured limit.
    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    /// The client did not finish the request head in time.
    #[error("timed out waiting for the request head")]
    HeadTimeout,

    /// The peer closed the socket before the request head was complete.
    #[error("connection closed before the request head was complete")]
    IncompleteHead,

    /// The request head could not be parsed.
    #[error("malformed request head: {0}")]
    MalformedHead(String),

    /// The request is not a WebSocket upgrade.
    #[error("not a websocket upgrade: {0}")]
    NotUpgrade(String),

    /// Configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The conversation layer refused the socket.
    #[error(transparent)]
    Ws(#[from] WsError),

    /// Socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ServerError {
    /// Status line sent before dropping a connection that failed before the
    /// upgrade, if the failure warrants a response.
    pub fn rejection_status(&self) -> Option<StatusCode> {
        match self {
            Self::HeadTooLarge(_) => Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE),
            Self::HeadTimeout => Some(StatusCode::REQUEST_TIMEOUT),
            Self::MalformedHead(_) | Self::NotUpgrade(_) => Some(StatusCode::BAD_REQUEST),
            Self::Ws(e) if e.is_connection_closed() => Some(StatusCode::SERVICE_UNAVAILABLE),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_status() {
        assert_eq!(
            ServerError::NotUpgrade("no upgrade header".into()).rejection_status(),
            Some(StatusCode::BAD_REQUEST)
        );
        assert_eq!(
            ServerError::HeadTooLarge(16).rejection_status(),
            Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE)
        );
        assert_eq!(
            ServerError::Ws(WsError::connection_closed("hub is shutting down")).rejection_status(),
            Some(StatusCode::SERVICE_UNAVAILABLE)
        );
        assert_eq!(ServerError::IncompleteHead.rejection_status(), None);
    }

    #[test]
    fn test_display() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:1".into(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("127.0.0.1:1"));
    }
}
