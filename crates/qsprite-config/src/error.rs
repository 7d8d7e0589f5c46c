//! Errors raised while loading and validating qsprite configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("no configuration file at {path}")]
    MissingFile {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The configuration file exists but could not be read.
    #[error("cannot read configuration file {path}")]
    Unreadable {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file extension or format name is neither TOML nor JSON.
    #[error("unsupported configuration format `{format}`, expected toml or json")]
    UnsupportedFormat {
        /// The rejected extension or format name.
        format: String,
    },

    /// Malformed TOML, including unknown keys.
    #[error("malformed TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed JSON, including unknown keys.
    #[error("malformed JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// A `.env` file exists but could not be parsed.
    #[error("malformed .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),

    /// A listen or metrics address is not a socket address.
    #[error("{field} is not a socket address: {addr}")]
    BadAddress {
        /// Dotted path of the field.
        field: &'static str,
        /// The rejected value.
        addr: String,
    },

    /// The origin allow-list is empty, which would refuse every handshake.
    #[error("conversation.allowed_origins must hold at least one pattern; use \"*:*\" to allow every origin")]
    NoOrigins,

    /// An origin allow-list entry is not a `host:port` pattern.
    #[error("conversation.allowed_origins has a bad pattern {pattern}: {reason}")]
    BadOrigin {
        /// The rejected pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A size, capacity or limit that must be positive is zero.
    #[error("{field} must be greater than zero")]
    ZeroLimit {
        /// Dotted path of the field.
        field: &'static str,
    },

    /// An environment override has a value of the wrong shape.
    #[error("cannot apply override {var}: {reason}")]
    BadOverride {
        /// The environment variable name.
        var: String,
        /// What the value should have looked like.
        reason: &'static str,
    },

    /// An environment variable under the prefix names no configuration key.
    #[error("{var} does not name a configuration key")]
    UnknownOverride {
        /// The environment variable name.
        var: String,
    },
}

impl ConfigError {
    pub(crate) fn bad_address(field: &'static str, addr: impl Into<String>) -> Self {
        Self::BadAddress {
            field,
            addr: addr.into(),
        }
    }

    pub(crate) fn bad_override(var: impl Into<String>, reason: &'static str) -> Self {
        Self::BadOverride {
            var: var.into(),
            reason,
        }
    }
}
