//! Tracks the open message channel of each conversation.
//!
//! One active channel per conversation: registering a new channel for an id
//! that already has one closes the old channel. Entries are only removed by
//! the connection that owns them, so a replaced channel shutting down late
//! cannot evict its successor.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::chat::core::ids::ConversationId;

/// Handle to one open channel.
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    connection_id: u64,
    token: CancellationToken,
}

impl ChannelHandle {
    /// Process-unique id of the underlying connection.
    #[must_use]
    pub const fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Token cancelled when the channel must shut down.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Ask the channel to close.
    pub fn close(&self) {
        self.token.cancel();
    }

    /// Whether the channel has been asked to close.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Conversation id to open channel map, owned by the server state.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: DashMap<ConversationId, ChannelHandle>,
    next_connection_id: AtomicU64,
}

impl ChannelRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle for a new connection. Not registered yet.
    #[must_use]
    pub fn open_handle(&self) -> ChannelHandle {
        ChannelHandle {
            connection_id: self.next_connection_id.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        }
    }

    /// Register `handle` as the channel of `conversation_id`.
    ///
    /// A previously registered channel is closed and returned.
    pub fn register(
        &self,
        conversation_id: ConversationId,
        handle: ChannelHandle,
    ) -> Option<ChannelHandle> {
        let displaced = self.channels.insert(conversation_id, handle);
        if let Some(old) = &displaced {
            tracing::info!(
                %conversation_id,
                connection_id = old.connection_id,
                "closing channel replaced by a newer connection"
            );
            old.close();
        }
        displaced
    }

    /// Current channel of `conversation_id`, if any.
    #[must_use]
    pub fn get(&self, conversation_id: ConversationId) -> Option<ChannelHandle> {
        self.channels
            .get(&conversation_id)
            .map(|entry| entry.value().clone())
    }

    /// Remove the entry for `conversation_id` if it belongs to `connection_id`.
    pub fn unregister(&self, conversation_id: ConversationId, connection_id: u64) -> bool {
        self.channels
            .remove_if(&conversation_id, |_, handle| {
                handle.connection_id == connection_id
            })
            .is_some()
    }

    /// Close and remove the channel of `conversation_id`.
    pub fn close(&self, conversation_id: ConversationId) -> bool {
        match self.channels.remove(&conversation_id) {
            Some((_, handle)) => {
                handle.close();
                true
            }
            None => false,
        }
    }

    /// Close and remove every channel. Returns how many were open.
    pub fn close_all(&self) -> usize {
        let ids: Vec<ConversationId> = self.channels.iter().map(|entry| *entry.key()).collect();
        ids.into_iter().filter(|id| self.close(*id)).count()
    }

    /// Number of registered channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no channel is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let registry = ChannelRegistry::new();
        let id = ConversationId::new();
        let handle = registry.open_handle();

        assert!(registry.register(id, handle.clone()).is_none());
        let found = registry.get(id).unwrap();
        assert_eq!(found.connection_id(), handle.connection_id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_second_register_closes_first() {
        let registry = ChannelRegistry::new();
        let id = ConversationId::new();
        let first = registry.open_handle();
        let second = registry.open_handle();
        assert_ne!(first.connection_id(), second.connection_id());

        registry.register(id, first.clone());
        let displaced = registry.register(id, second.clone()).unwrap();

        assert_eq!(displaced.connection_id(), first.connection_id());
        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(registry.get(id).unwrap().connection_id(), second.connection_id());
    }

    #[test]
    fn test_stale_unregister_keeps_replacement() {
        let registry = ChannelRegistry::new();
        let id = ConversationId::new();
        let first = registry.open_handle();
        let second = registry.open_handle();
        registry.register(id, first.clone());
        registry.register(id, second.clone());

        assert!(!registry.unregister(id, first.connection_id()));
        assert!(registry.get(id).is_some());

        assert!(registry.unregister(id, second.connection_id()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_close_cancels_and_removes() {
        let registry = ChannelRegistry::new();
        let id = ConversationId::new();
        let handle = registry.open_handle();
        registry.register(id, handle.clone());

        assert!(registry.close(id));
        assert!(handle.is_closed());
        assert!(registry.get(id).is_none());
        assert!(!registry.close(id));
    }

    #[test]
    fn test_close_all() {
        let registry = ChannelRegistry::new();
        let handles: Vec<_> = (0..3).map(|_| registry.open_handle()).collect();
        for handle in &handles {
            registry.register(ConversationId::new(), handle.clone());
        }

        assert_eq!(registry.close_all(), 3);
        assert!(registry.is_empty());
        assert!(handles.iter().all(ChannelHandle::is_closed));
    }
}
