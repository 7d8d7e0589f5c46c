//! The contract a bindable service satisfies, and the catalog of services a
//! hub can bind.
//!
//! Authentication is always asynchronous at this boundary. A service that
//! decides synchronously returns [`ready`]:
//!
//! ```ignore
//! impl Service for Echo {
//!     fn request_auth<'a>(&'a self, _request: &'a UpgradeRequest) -> AuthFuture<'a> {
//!         ready(true)
//!     }
//!
//!     fn receive_message(&self, envelope: Envelope) -> BoxFuture<'_, WsResult<()>> {
//!         Box::pin(async move { self.conversation.send(&envelope) })
//!     }
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::conversation::ConversationHandle;
use crate::envelope::Envelope;
use crate::error::{WsError, WsResult};
use crate::request::UpgradeRequest;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The result of an authentication request.
pub type AuthFuture<'a> = BoxFuture<'a, bool>;

/// Wrap an already-known value as a [`BoxFuture`].
pub fn ready<'a, T: Send + 'a>(value: T) -> BoxFuture<'a, T> {
    Box::pin(std::future::ready(value))
}

/// An application handler bound into a conversation.
pub trait Service: Send + Sync + 'static {
    /// Decide whether the upgrade request may use this service.
    ///
    /// A `false` result aborts the conversation before any handshake byte is
    /// written.
    fn request_auth<'a>(&'a self, request: &'a UpgradeRequest) -> AuthFuture<'a>;

    /// Handle an envelope addressed to this service.
    ///
    /// Errors are logged by the conversation and do not close it.
    fn receive_message(&self, envelope: Envelope) -> BoxFuture<'_, WsResult<()>>;

    /// Called once the conversation is open, or right after a late binding.
    fn on_open(&self) {}

    /// Called once when an open conversation closes.
    fn on_close(&self) {}
}

/// Creates a fresh service instance for each conversation that binds it.
pub trait ServiceFactory: Send + Sync + 'static {
    /// Create an instance for `context`.
    fn create(&self, context: ServiceContext) -> Arc<dyn Service>;
}

impl<F> ServiceFactory for F
where
    F: Fn(ServiceContext) -> Arc<dyn Service> + Send + Sync + 'static,
{
    fn create(&self, context: ServiceContext) -> Arc<dyn Service> {
        self(context)
    }
}

/// What a service instance knows about where it is bound.
#[derive(Clone)]
pub struct ServiceContext {
    name: String,
    conversation: ConversationHandle,
}

impl ServiceContext {
    pub(crate) fn new(name: impl Into<String>, conversation: ConversationHandle) -> Self {
        Self {
            name: name.into(),
            conversation,
        }
    }

    /// Name the service was bound under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle to the owning conversation.
    pub fn conversation(&self) -> &ConversationHandle {
        &self.conversation
    }

    /// Consume the context, keeping the conversation handle.
    pub fn into_conversation(self) -> ConversationHandle {
        self.conversation
    }
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("name", &self.name)
            .field("token", &self.conversation.token())
            .finish()
    }
}

/// A service bound into one conversation.
pub struct ServiceInstance {
    name: String,
    service: Arc<dyn Service>,
    authenticated: bool,
}

impl ServiceInstance {
    pub(crate) fn new(name: impl Into<String>, service: Arc<dyn Service>, authenticated: bool) -> Self {
        Self {
            name: name.into(),
            service,
            authenticated,
        }
    }

    /// Name the service was bound under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The service.
    pub fn service(&self) -> &Arc<dyn Service> {
        &self.service
    }

    /// Outcome of the service's authentication request.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

impl fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceInstance")
            .field("name", &self.name)
            .field("authenticated", &self.authenticated)
            .finish_non_exhaustive()
    }
}

enum CatalogEntry {
    Conversational(Arc<dyn ServiceFactory>),
    HttpOnly,
}

/// Registered services, by name.
#[derive(Default)]
pub struct ServiceCatalog {
    entries: IndexMap<String, CatalogEntry>,
}

impl ServiceCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bindable service.
    #[must_use]
    pub fn register(mut self, name: impl Into<String>, factory: impl ServiceFactory) -> Self {
        self.entries
            .insert(name.into(), CatalogEntry::Conversational(Arc::new(factory)));
        self
    }

    /// Register a name that exists but cannot be bound to a conversation.
    #[must_use]
    pub fn register_http_only(mut self, name: impl Into<String>) -> Self {
        self.entries.insert(name.into(), CatalogEntry::HttpOnly);
        self
    }

    /// Look up the factory for `name`.
    ///
    /// # Errors
    ///
    /// `UnknownService` if nothing is registered under `name`;
    /// `NotConversational` if the entry cannot be bound.
    pub fn resolve(&self, name: &str) -> WsResult<Arc<dyn ServiceFactory>> {
        match self.entries.get(name) {
            Some(CatalogEntry::Conversational(factory)) => Ok(Arc::clone(factory)),
            Some(CatalogEntry::HttpOnly) => Err(WsError::NotConversational {
                name: name.to_string(),
            }),
            None => Err(WsError::unknown_service(name)),
        }
    }

    /// Check if a name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ServiceCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}
