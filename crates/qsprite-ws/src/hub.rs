//! The hub: the catalog, the registry and the shared configuration every
//! conversation is created against.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ConversationConfig;
use crate::conversation::{Conversation, ConversationEvent, ConversationHandle, ConversationToken};
use crate::error::{WsError, WsResult};
use crate::origin::OriginPolicy;
use crate::registry::{ConversationRegistry, RegistryStats};
use crate::request::UpgradeRequest;
use crate::selector::ProtocolSelector;
use crate::service::ServiceCatalog;

/// A conversation started by [`Hub::accept`].
///
/// `events` is subscribed before the task is spawned, so it observes every
/// event the conversation publishes, `Open` included.
#[derive(Debug)]
pub struct Accepted {
    /// Handle for sending to and closing the conversation.
    pub handle: ConversationHandle,
    /// Every event from the conversation.
    pub events: broadcast::Receiver<ConversationEvent>,
    /// The running conversation.
    pub task: JoinHandle<WsResult<()>>,
}

/// Shared state behind every conversation.
///
/// Conversations hold a weak reference; dropping the last `Arc<Hub>` makes
/// pending bindings fail with `HubGone`.
#[derive(Debug)]
pub struct Hub {
    catalog: ServiceCatalog,
    registry: ConversationRegistry,
    config: ConversationConfig,
    origins: OriginPolicy,
    is_shutdown: AtomicBool,
}

impl Hub {
    /// Create a hub.
    ///
    /// # Errors
    ///
    /// `HandshakeFailed` if an allowed-origin pattern does not parse.
    pub fn new(catalog: ServiceCatalog, config: ConversationConfig) -> WsResult<Arc<Self>> {
        let origins = OriginPolicy::new(&config.allowed_origins)?;
        Ok(Arc::new(Self {
            catalog,
            registry: ConversationRegistry::new(),
            config,
            origins,
            is_shutdown: AtomicBool::new(false),
        }))
    }

    /// Create a hub with the default configuration, which allows every origin.
    pub fn with_catalog(catalog: ServiceCatalog) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            registry: ConversationRegistry::new(),
            config: ConversationConfig::default(),
            origins: OriginPolicy::allow_all(),
            is_shutdown: AtomicBool::new(false),
        })
    }

    /// Get the service catalog.
    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    /// Get the open-conversation registry.
    pub fn registry(&self) -> &ConversationRegistry {
        &self.registry
    }

    /// Get the conversation configuration.
    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    /// Get the parsed origin allow-list.
    pub fn origins(&self) -> &OriginPolicy {
        &self.origins
    }

    /// Get registry statistics.
    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    /// Get the handle of an open conversation.
    pub fn conversation(&self, token: &ConversationToken) -> Option<ConversationHandle> {
        self.registry.get(token)
    }

    /// Create a conversation for an upgraded socket without starting it.
    ///
    /// `head` holds bytes read past the end of the request headers.
    pub fn select<S>(
        self: &Arc<Self>,
        socket: S,
        request: UpgradeRequest,
        head: Bytes,
    ) -> Conversation<S>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        ProtocolSelector::select(self, socket, request, head)
    }

    /// Create a conversation and run it on a new task.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` once [`shutdown`](Self::shutdown) has been called.
    pub fn accept<S>(
        self: &Arc<Self>,
        socket: S,
        request: UpgradeRequest,
        head: Bytes,
    ) -> WsResult<Accepted>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        if self.is_shutdown() {
            return Err(WsError::connection_closed("hub is shutting down"));
        }
        let conversation = self.select(socket, request, head);
        let handle = conversation.handle();
        let events = handle.subscribe();
        Ok(Accepted {
            handle,
            events,
            task: tokio::spawn(conversation.run()),
        })
    }

    /// Check if shutdown has been triggered.
    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    /// Stop accepting and ask every open conversation to close.
    ///
    /// Conversations still binding fail before their handshake instead of
    /// opening. Returns the number of conversations asked to close. Repeated
    /// calls return 0.
    pub fn shutdown(&self) -> usize {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            return 0;
        }
        let handles = self.registry.handles();
        info!(conversations = handles.len(), "closing all conversations");
        for handle in &handles {
            handle.close();
        }
        handles.len()
    }
}
