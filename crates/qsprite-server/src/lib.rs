//! # qsprite-server
//!
//! TCP upgrade listener for qsprite.
//!
//! The listener owns the part of the HTTP exchange the conversation layer
//! does not: it accepts sockets, enables TCP keepalive, reads the request
//! head within a size and time limit, and answers non-upgrade requests with
//! an error status. Upgrade requests are handed to a [`qsprite_ws::Hub`]
//! together with any bytes read past the header block.
//!
//! ```text
//! accept → keepalive → read_head → parse_head ─┬→ Hub::accept → conversation
//!                                              └→ 400/408/431, close
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use qsprite_server::{Server, ShutdownSignal};
//!
//! let shutdown = ShutdownSignal::new();
//! let server = Server::from_config(&config, catalog)?;
//! tokio::spawn(server.run_with_shutdown(shutdown.clone()));
//! // later
//! shutdown.trigger();
//! ```

#![doc(html_root_url = "https://docs.rs/qsprite-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod handoff;
mod server;
pub mod shutdown;

pub use error::ServerError;
pub use handoff::{parse_head, read_head};
pub use server::Server;
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};
