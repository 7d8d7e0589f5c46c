//! Open-conversation registry.
//!
//! Owned by the [`Hub`](crate::hub::Hub). A conversation inserts itself once
//! its handshake succeeds and removes itself when it closes; each token is
//! written by exactly one conversation task.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tracing::debug;

use crate::conversation::{ConversationHandle, ConversationToken};

/// Statistics about the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Currently open conversations.
    pub open_conversations: usize,
    /// Conversations ever registered.
    pub total_opened: usize,
    /// Conversations ever deregistered.
    pub total_closed: usize,
}

/// Token to open-conversation table.
#[derive(Debug, Default)]
pub struct ConversationRegistry {
    conversations: DashMap<ConversationToken, ConversationHandle>,
    total_opened: AtomicUsize,
    total_closed: AtomicUsize,
}

impl ConversationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open conversation.
    ///
    /// Returns `false` (and leaves the table unchanged) if the token is
    /// already registered.
    pub fn insert(&self, handle: ConversationHandle) -> bool {
        let token = handle.token();
        match self.conversations.entry(token) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(handle);
                self.total_opened.fetch_add(1, Ordering::Relaxed);
                debug!(token = %token, open = self.conversations.len(), "conversation registered");
                true
            }
        }
    }

    /// Deregister a conversation.
    pub fn remove(&self, token: &ConversationToken) -> Option<ConversationHandle> {
        let removed = self.conversations.remove(token).map(|(_, handle)| handle);
        if removed.is_some() {
            self.total_closed.fetch_add(1, Ordering::Relaxed);
            debug!(token = %token, "conversation deregistered");
        }
        removed
    }

    /// Get the handle of an open conversation.
    pub fn get(&self, token: &ConversationToken) -> Option<ConversationHandle> {
        self.conversations.get(token).map(|e| e.value().clone())
    }

    /// Check if a token is registered.
    pub fn contains(&self, token: &ConversationToken) -> bool {
        self.conversations.contains_key(token)
    }

    /// Number of open conversations.
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// Check if no conversation is open.
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Tokens of all open conversations.
    pub fn tokens(&self) -> Vec<ConversationToken> {
        self.conversations.iter().map(|e| *e.key()).collect()
    }

    /// Handles of all open conversations.
    pub fn handles(&self) -> Vec<ConversationHandle> {
        self.conversations.iter().map(|e| e.value().clone()).collect()
    }

    /// Get registry statistics.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            open_conversations: self.conversations.len(),
            total_opened: self.total_opened.load(Ordering::Relaxed),
            total_closed: self.total_closed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Dialect;

    fn handle() -> ConversationHandle {
        ConversationHandle::detached(Dialect::Legacy)
    }

    #[test]
    fn test_insert_and_remove() {
        let registry = ConversationRegistry::new();
        let handle = handle();
        let token = handle.token();

        assert!(registry.insert(handle));
        assert!(registry.contains(&token));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(&token).is_some());
        assert!(registry.is_empty());
        assert!(registry.remove(&token).is_none());
    }

    #[test]
    fn test_duplicate_token_rejected() {
        let registry = ConversationRegistry::new();
        let handle = handle();
        assert!(registry.insert(handle.clone()));
        assert!(!registry.insert(handle));
        assert_eq!(registry.stats().total_opened, 1);
    }

    #[test]
    fn test_stats() {
        let registry = ConversationRegistry::new();
        let a = handle();
        let b = handle();
        registry.insert(a.clone());
        registry.insert(b);
        registry.remove(&a.token());

        assert_eq!(
            registry.stats(),
            RegistryStats {
                open_conversations: 1,
                total_opened: 2,
                total_closed: 1,
            }
        );
        assert_eq!(registry.tokens().len(), 1);
        assert_eq!(registry.handles().len(), 1);
    }
}
