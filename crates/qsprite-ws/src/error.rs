//! Error types for conversation and codec operations.
//!
//! This module defines the errors that can occur while selecting a dialect,
//! binding services, performing a handshake, decoding frames and sending
//! on a conversation.

use thiserror::Error;

/// Result type for conversation operations.
pub type WsResult<T> = Result<T, WsError>;

/// Errors that can occur during conversation operations.
#[derive(Debug, Error)]
pub enum WsError {
    /// The upgrade request could not be turned into a conversation.
    #[error("not a WebSocket upgrade request: {reason}")]
    NotWebSocketRequest {
        /// Reason why the request is not a valid upgrade.
        reason: String,
    },

    /// The dialect-specific handshake failed.
    #[error("WebSocket handshake failed: {0}")]
    HandshakeFailed(String),

    /// The conversation is not open.
    ///
    /// Returned synchronously by `send` and `ping` on a conversation that
    /// never opened or has already closed.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for the closed state.
        reason: String,
    },

    /// The peer violated the wire protocol.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// No service is registered under the requested name.
    #[error("unknown service: {name}")]
    UnknownService {
        /// The requested service name.
        name: String,
    },

    /// The service is already bound to this conversation.
    #[error("service already bound: {name}")]
    ServiceAlreadyBound {
        /// The requested service name.
        name: String,
    },

    /// The registered entry cannot be bound to a conversation.
    #[error("service cannot be bound to a conversation: {name}")]
    NotConversational {
        /// The requested service name.
        name: String,
    },

    /// The conversation requested no services.
    #[error("connection must bind at least one service")]
    NoServices,

    /// A service rejected the authentication request.
    #[error("authentication rejected by service: {name}")]
    AuthRejected {
        /// The service that rejected the request.
        name: String,
    },

    /// The request origin is not allowed.
    #[error("origin rejected: {origin}")]
    OriginRejected {
        /// The offending origin, or `<missing>`.
        origin: String,
    },

    /// The hosting hub has been dropped.
    #[error("hub is no longer available")]
    HubGone,

    /// An envelope could not be decoded.
    #[error("failed to decode envelope: {0}")]
    DecodeFailed(String),

    /// An envelope could not be encoded.
    #[error("failed to encode envelope: {0}")]
    EncodeFailed(String),

    /// The operation is not supported by the active dialect.
    #[error("operation not supported by {dialect}: {operation}")]
    Unsupported {
        /// The dialect name.
        dialect: &'static str,
        /// The attempted operation.
        operation: &'static str,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WsError {
    /// Create a new "not a WebSocket request" error.
    pub fn not_websocket(reason: impl Into<String>) -> Self {
        Self::NotWebSocketRequest {
            reason: reason.into(),
        }
    }

    /// Create a new handshake failed error.
    pub fn handshake_failed(reason: impl Into<String>) -> Self {
        Self::HandshakeFailed(reason.into())
    }

    /// Create a new connection closed error.
    pub fn connection_closed(reason: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            reason: reason.into(),
        }
    }

    /// Create a new protocol error.
    pub fn protocol_error(reason: impl Into<String>) -> Self {
        Self::ProtocolError(reason.into())
    }

    /// Create a new unknown service error.
    pub fn unknown_service(name: impl Into<String>) -> Self {
        Self::UnknownService { name: name.into() }
    }

    /// Create a new already-bound error.
    pub fn already_bound(name: impl Into<String>) -> Self {
        Self::ServiceAlreadyBound { name: name.into() }
    }

    /// Create a new auth rejected error.
    pub fn auth_rejected(name: impl Into<String>) -> Self {
        Self::AuthRejected { name: name.into() }
    }

    /// Create a new origin rejected error.
    pub fn origin_rejected(origin: impl Into<String>) -> Self {
        Self::OriginRejected {
            origin: origin.into(),
        }
    }

    /// Check if this is the distinguished "connection closed" error.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed { .. })
    }

    /// Check if this error must end the conversation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::HandshakeFailed(_)
                | Self::ConnectionClosed { .. }
                | Self::ProtocolError(_)
                | Self::AuthRejected { .. }
                | Self::OriginRejected { .. }
                | Self::HubGone
                | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_error_not_websocket() {
        let err = WsError::not_websocket("missing upgrade header");
        assert!(matches!(err, WsError::NotWebSocketRequest { .. }));
        assert!(err.to_string().contains("missing upgrade header"));
    }

    #[test]
    fn test_ws_error_connection_closed() {
        let err = WsError::connection_closed("conversation is not open");
        assert!(err.is_connection_closed());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unknown_service_not_fatal() {
        let err = WsError::unknown_service("chat");
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "unknown service: chat");
    }

    #[test]
    fn test_auth_rejected_is_fatal() {
        let err = WsError::auth_rejected("billing");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("billing"));
    }

    #[test]
    fn test_unsupported_display() {
        let err = WsError::Unsupported {
            dialect: "legacy",
            operation: "binary frames",
        };
        assert_eq!(
            err.to_string(),
            "operation not supported by legacy: binary frames"
        );
    }
}
