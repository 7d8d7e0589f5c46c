//! Conversations over upgraded WebSocket sockets.
//!
//! A client upgrades an HTTP request and names the services it wants in
//! the query string (`?bind_services=chat,presence`). The [`Hub`] picks a
//! wire dialect from `Sec-WebSocket-Version`, binds and authenticates each
//! service, completes the dialect handshake and then routes JSON envelopes
//! between the socket and the bound services.
//!
//! # Example
//!
//! ```ignore
//! use qsprite_ws::{Accepted, ConversationConfig, ConversationEvent, Hub, ServiceCatalog};
//!
//! let catalog = ServiceCatalog::new().register("chat", ChatService::create);
//! let hub = Hub::new(catalog, ConversationConfig::default())?;
//!
//! // After reading the request head off an accepted TCP stream:
//! let Accepted { handle, mut events, task } = hub.accept(stream, request, leftover)?;
//! assert_eq!(events.recv().await?, ConversationEvent::Open);
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  UpgradeRequest ──► ProtocolSelector ──► Conversation<S>      │
//! │                          │                    │               │
//! │                      Dialect            bind_services()       │
//! │                   (hybi / legacy)             │               │
//! │                                          initialize()         │
//! │                                     (handshake, registry)     │
//! │                                               │               │
//! │        socket bytes ──► Decoder ──► Packet ──► handle_packet  │
//! │                                               │               │
//! │                                  Envelope ──► Service         │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Dialects
//!
//! - `hybi-07-12`, `hybi-16`, `hybi-17`: length-prefixed, masked frames
//!   with fragmentation and control frames
//! - `legacy`: `0x00 … 0xFF` delimited UTF-8 with the optional
//!   `Sec-WebSocket-Key1/2` challenge

pub mod codec;
pub mod config;
pub mod conversation;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod hub;
pub mod hybi;
pub mod legacy;
pub mod message;
pub mod origin;
pub mod registry;
pub mod request;
pub mod selector;
pub mod service;

pub use codec::{Decoder, Dialect, Packet};
pub use config::{ConversationConfig, ANY_ORIGIN};
pub use conversation::{
    Conversation, ConversationEvent, ConversationHandle, ConversationState, ConversationToken,
    PacketOutcome,
};
pub use envelope::Envelope;
pub use error::{WsError, WsResult};
pub use frame::{Frame, Opcode};
pub use hub::{Accepted, Hub};
pub use hybi::HybiVersion;
pub use message::Message;
pub use origin::{verify_origin, OriginPattern, OriginPolicy};
pub use registry::{ConversationRegistry, RegistryStats};
pub use request::UpgradeRequest;
pub use selector::ProtocolSelector;
pub use service::{
    ready, AuthFuture, BoxFuture, Service, ServiceCatalog, ServiceContext, ServiceFactory,
    ServiceInstance,
};
