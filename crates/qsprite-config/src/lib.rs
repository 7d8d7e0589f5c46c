//! Typed configuration for qsprite.
//!
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! The root type is [`QspriteConfig`]:
//!
//! - [`ServerConfig`] - listener address, header limits, TCP keepalive
//! - [`ConversationSection`] - origin allow-list, message size, nonce timeout
//! - [`TelemetrySection`] - logging and metrics
//!
//! # Example
//!
//! ```no_run
//! use qsprite_config::{ConfigLoader, QspriteConfig};
//!
//! # fn main() -> Result<(), qsprite_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_optional_file("qsprite.toml")?
//!     .with_env_prefix("QSPRITE")
//!     .load()?;
//!
//! println!("listening on {}", config.server.listen_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! listen_addr = "0.0.0.0:8080"
//! shutdown_timeout_secs = 30
//! max_header_bytes = 16384
//! keepalive_secs = 50
//!
//! [conversation]
//! allowed_origins = ["example.com:443", "*:8080"]
//! max_message_size = 67108864
//! nonce_timeout_ms = 5000
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//!
//! [telemetry.metrics]
//! enabled = true
//! addr = "0.0.0.0:9090"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables:
//!
//! - `QSPRITE__SERVER__LISTEN_ADDR=0.0.0.0:9000`
//! - `QSPRITE__CONVERSATION__ALLOWED_ORIGINS=example.com:443,*:8080`
//! - `QSPRITE__TELEMETRY__METRICS__ENABLED=false`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::*;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
