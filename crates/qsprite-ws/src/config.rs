//! Conversation configuration.
//!
//! This module defines the per-hub settings shared by every conversation:
//! the origin allow-list, frame size limits and handshake timeouts.

use std::time::Duration;

/// Allow-list entry that accepts every origin.
pub const ANY_ORIGIN: &str = "*:*";

/// Configuration shared by all conversations of a hub.
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Allowed origins as `host:port` patterns (default: `["*:*"]`).
    pub allowed_origins: Vec<String>,
    /// Maximum size of a single frame or reassembled message (default: 64 MB).
    pub max_message_size: usize,
    /// How long the legacy handshake waits for its 8-byte nonce (default: 5 seconds).
    pub nonce_timeout: Duration,
    /// TCP keepalive interval applied by the listener (default: 50 seconds).
    pub keepalive_interval: Duration,
    /// Capacity of each conversation's event channel (default: 64).
    pub event_capacity: usize,
    /// Read buffer size for socket reads (default: 16 KB).
    pub read_buffer_size: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![ANY_ORIGIN.to_string()],
            max_message_size: 64 * 1024 * 1024, // 64 MB
            nonce_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(50),
            event_capacity: 64,
            read_buffer_size: 16 * 1024, // 16 KB
        }
    }
}

impl ConversationConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the origin allow-list.
    pub fn allowed_origins<I, T>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.allowed_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Set the maximum message size.
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the legacy nonce timeout.
    pub fn nonce_timeout(mut self, timeout: Duration) -> Self {
        self.nonce_timeout = timeout;
        self
    }

    /// Set the TCP keepalive interval.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set the event channel capacity.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Set the read buffer size.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }
}
