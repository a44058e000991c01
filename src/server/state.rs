//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::chat::core::config::ChatConfig;
use crate::chat::core::errors::ChatResult;
use crate::chat::generator::{ResponseGenerator, TemplateResponder};
use crate::chat::service::ConversationService;
use crate::chat::storage::{ChatStore, SqliteChatStore};

use super::registry::ChannelRegistry;

/// Shared application state.
pub struct AppState {
    /// Conversation and message operations.
    pub conversations: ConversationService,
    /// Reply generator used by message channels.
    pub generator: Arc<dyn ResponseGenerator>,
    /// Open message channels, one per conversation.
    pub channels: ChannelRegistry,
    /// Origin allowed for cross-origin HTTP and channel requests.
    pub allowed_origin: String,
    /// Refuse channel upgrades without an `Origin` header.
    pub require_origin: bool,
}

impl AppState {
    /// Assemble state from its parts. Channel requests without an `Origin`
    /// header are accepted.
    #[must_use]
    pub fn new(
        store: Arc<dyn ChatStore>,
        generator: Arc<dyn ResponseGenerator>,
        allowed_origin: impl Into<String>,
    ) -> Arc<Self> {
        Self::with_origin_policy(store, generator, allowed_origin, false)
    }

    /// Assemble state, choosing whether channel requests must carry an `Origin`.
    #[must_use]
    pub fn with_origin_policy(
        store: Arc<dyn ChatStore>,
        generator: Arc<dyn ResponseGenerator>,
        allowed_origin: impl Into<String>,
        require_origin: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            conversations: ConversationService::new(store),
            generator,
            channels: ChannelRegistry::new(),
            allowed_origin: allowed_origin.into(),
            require_origin,
        })
    }

    /// Open the configured database and build the default state.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn from_config(config: &ChatConfig) -> ChatResult<Arc<Self>> {
        let store = SqliteChatStore::open(&config.sqlite_path).await?;
        tracing::info!(path = %config.sqlite_path.display(), "chat store opened");

        Ok(Self::with_origin_policy(
            Arc::new(store),
            Arc::new(TemplateResponder::from_config(&config.responder)),
            config.allowed_origin.clone(),
            config.require_origin,
        ))
    }
}
