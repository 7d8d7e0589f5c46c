//! # qsprite
//!
//! **Service-routed WebSocket conversations over two wire dialects**
//!
//! qsprite turns upgraded sockets into conversations: it binds the services
//! a client asks for, lets each service authenticate the request, completes
//! the handshake for the negotiated dialect and routes sentinel-prefixed
//! JSON envelopes to the bound services.
//!
//! - **Dialects** – RFC 6455 style framing for protocol versions 8 and up,
//!   plus the legacy `0x00 … 0xFF` text framing for older clients
//! - **Services** – pluggable authentication and message handling per name
//! - **Observability** – `tracing` logs and `metrics` counters throughout
//! - **Layered configuration** – defaults, TOML or JSON files, environment
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use qsprite::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new()
//!         .with_optional_file("qsprite.toml")?
//!         .with_env_prefix("QSPRITE")
//!         .load()?;
//!     init_telemetry(&config.telemetry_config())?;
//!
//!     let catalog = ServiceCatalog::new().register("chat", ChatService::new);
//!     Server::from_config(&config, catalog)?.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Server ──socket+head──→ Hub ──→ ProtocolSelector ──→ Conversation
//!                                                       │  bind → auth → handshake
//!                                                       ↓
//!                              Decoder (hybi | legacy) → Envelope → Service
//! ```

#![doc(html_root_url = "https://docs.rs/qsprite/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Conversation layer
pub use qsprite_ws as ws;

// Upgrade listener
pub use qsprite_server as server;

// Configuration
pub use qsprite_config as config;

// Logging and metrics
pub use qsprite_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use qsprite::prelude::*;
/// ```
pub mod prelude {
    pub use qsprite_ws::{
        ready, Accepted, AuthFuture, BoxFuture, ConversationConfig, ConversationEvent, ConversationHandle,
        ConversationState, ConversationToken, Dialect, Envelope, Hub, Message, Service,
        ServiceCatalog, ServiceContext, UpgradeRequest, WsError, WsResult,
    };

    pub use qsprite_server::{Server, ServerError, ShutdownSignal};

    pub use qsprite_config::{ConfigError, ConfigLoader, QspriteConfig};

    pub use qsprite_telemetry::{init_telemetry, TelemetryConfig, TelemetryError};
}
