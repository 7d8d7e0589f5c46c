//! The upgrade listener.
//!
//! Accepts TCP connections, reads the upgrade request head, and hands the
//! socket to the [`Hub`], which picks the dialect and runs the conversation.
//!
//! ```rust,ignore
//! use qsprite_config::ConfigLoader;
//! use qsprite_server::Server;
//! use qsprite_ws::ServiceCatalog;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().with_env_prefix("QSPRITE").load()?;
//!     let catalog = ServiceCatalog::new().register("chat", chat_service);
//!     Server::from_config(&config, catalog)?.run().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use qsprite_config::{QspriteConfig, ServerConfig};
use qsprite_ws::{Hub, ServiceCatalog, WsError};
use socket2::{SockRef, TcpKeepalive};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::handoff::{read_head, rejection};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};
use crate::ServerError;

/// TCP listener that upgrades connections into conversations.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    hub: Arc<Hub>,
}

impl Server {
    /// Create a server for an existing hub.
    #[must_use]
    pub fn new(config: ServerConfig, hub: Arc<Hub>) -> Self {
        Self { config, hub }
    }

    /// Validate `config` and build the hub and server it describes.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or the origin allow-list
    /// cannot be parsed.
    pub fn from_config(config: &QspriteConfig, catalog: ServiceCatalog) -> Result<Self, ServerError> {
        config.validate()?;
        let hub = Hub::new(catalog, config.conversation_config())?;
        Ok(Self::new(config.server.clone(), hub))
    }

    /// The hub conversations are handed to.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Listener configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn keepalive(&self) -> Option<Duration> {
        (self.config.keepalive_secs > 0).then(|| Duration::from_secs(self.config.keepalive_secs))
    }

    /// Bind the configured address and serve until SIGTERM or SIGINT.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Bind the configured address and serve until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr: SocketAddr =
            self.config
                .listen_addr
                .parse()
                .map_err(|e: std::net::AddrParseError| ServerError::InvalidAddress {
                    addr: self.config.listen_addr.clone(),
                    reason: e.to_string(),
                })?;

        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already bound listener until `shutdown`
    /// fires, then close every open conversation and wait for them to
    /// drain, at most `shutdown_timeout_secs`.
    ///
    /// # Errors
    ///
    /// Currently infallible once the listener is bound.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "listening for upgrades");
        }

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();
        let max_connections = usize::try_from(server.config.max_connections).unwrap_or(usize::MAX);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            if tracker.active_connections() >= max_connections {
                                warn!(%peer, max_connections, "connection limit reached, dropping");
                                continue;
                            }
                            let server = Arc::clone(&server);
                            let token = tracker.acquire();
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer).await {
                                    debug!(%peer, error = %e, "connection ended with error");
                                }
                                drop(token);
                            });
                        }
                        Err(e) => error!(error = %e, "failed to accept connection"),
                    }
                }
                () = shutdown.recv() => {
                    info!("shutdown signal received, no longer accepting");
                    break;
                }
            }
        }

        let closing = server.hub.shutdown();
        let grace = Duration::from_secs(server.config.shutdown_timeout_secs);
        info!(
            conversations = closing,
            connections = tracker.active_connections(),
            ?grace,
            "waiting for connections to drain"
        );

        tokio::select! {
            () = tracker.wait_for_drain() => info!("all connections closed"),
            () = tokio::time::sleep(grace) => warn!(
                connections = tracker.active_connections(),
                "shutdown grace period elapsed"
            ),
        }

        info!("server stopped");
        Ok(())
    }

    async fn handle_connection(
        self: &Arc<Self>,
        mut stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<(), ServerError> {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "failed to set TCP_NODELAY");
        }
        if let Some(interval) = self.keepalive() {
            let keepalive = TcpKeepalive::new().with_time(interval);
            if let Err(e) = SockRef::from(&stream).set_tcp_keepalive(&keepalive) {
                debug!(%peer, error = %e, "failed to enable TCP keepalive");
            }
        }

        let limit = Duration::from_millis(self.config.header_timeout_ms);
        let handoff = match read_head(&mut stream, self.config.max_header_bytes, limit).await {
            Ok(handoff) => handoff,
            Err(e) => return Self::reject(stream, peer, e).await,
        };
        let (request, head) = handoff;
        debug!(%peer, url = request.url(), "upgrade request received");

        if self.hub.is_shutdown() {
            let err = WsError::connection_closed("server is shutting down");
            return Self::reject(stream, peer, err.into()).await;
        }
        let accepted = self.hub.accept(stream, request, head)?;

        match accepted.task.await {
            Ok(result) => result.map_err(ServerError::from),
            Err(e) => {
                error!(%peer, error = %e, "conversation task failed");
                Ok(())
            }
        }
    }

    async fn reject(mut stream: TcpStream, peer: SocketAddr, err: ServerError) -> Result<(), ServerError> {
        warn!(%peer, error = %err, "rejecting connection");
        if let Some(status) = err.rejection_status() {
            let _ = stream.write_all(rejection(status).as_bytes()).await;
        }
        let _ = stream.shutdown().await;
        Err(err)
    }
}
