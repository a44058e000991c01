//! Conversation orchestration over a [`ChatStore`].

use std::sync::Arc;

use tracing::error;

use crate::chat::core::errors::ChatResult;
use crate::chat::core::ids::ConversationId;
use crate::chat::core::records::{Conversation, Message, Sender};
use crate::chat::storage::ChatStore;

/// Thin service layer used by the HTTP routes and the message channel.
#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn ChatStore>,
}

impl ConversationService {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Create a conversation.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn create_conversation(&self, title: Option<String>) -> ChatResult<Conversation> {
        self.store
            .create_conversation(title)
            .await
            .inspect_err(|e| error!(error = %e, "failed to create conversation"))
    }

    /// List all conversations, newest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn list_conversations(&self) -> ChatResult<Vec<Conversation>> {
        self.store
            .list_conversations()
            .await
            .inspect_err(|e| error!(error = %e, "failed to list conversations"))
    }

    /// Fetch a conversation by id.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn get_conversation(&self, id: ConversationId) -> ChatResult<Option<Conversation>> {
        self.store
            .get_conversation(id)
            .await
            .inspect_err(|e| error!(error = %e, conversation_id = %id, "failed to load conversation"))
    }

    /// Delete a conversation and its messages.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn delete_conversation(&self, id: ConversationId) -> ChatResult<bool> {
        self.store
            .delete_conversation(id)
            .await
            .inspect_err(|e| error!(error = %e, conversation_id = %id, "failed to delete conversation"))
    }

    /// Persist one message. Used for both user input and generated replies.
    ///
    /// # Errors
    /// Returns an error if storage access fails or the conversation is gone.
    pub async fn save_message(
        &self,
        conversation_id: ConversationId,
        sender: Sender,
        content: String,
    ) -> ChatResult<Message> {
        self.store
            .append_message(conversation_id, sender, content)
            .await
            .inspect_err(|e| error!(error = %e, %conversation_id, %sender, "failed to save message"))
    }

    /// Messages of a conversation, oldest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn history(&self, conversation_id: ConversationId) -> ChatResult<Vec<Message>> {
        self.store
            .list_messages(conversation_id)
            .await
            .inspect_err(|e| error!(error = %e, %conversation_id, "failed to load history"))
    }
}
