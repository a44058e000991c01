//! Conversations, messages and reply generation.
//!
//! Layout:
//! - [`core`]: ids, records, errors and configuration.
//! - [`storage`]: the `SQLite` store.
//! - [`service`]: orchestration used by the server.
//! - [`generator`]: the templated reply generator.

pub mod core;
pub mod generator;
pub mod service;
pub mod storage;

pub use self::core::{
    ChatConfig, ChatError, ChatResult, Conversation, ConversationId, Message, ResponderConfig,
    Sender,
};
pub use generator::{ResponseGenerator, TemplateResponder};
pub use service::ConversationService;
pub use storage::{ChatStore, SqliteChatStore};
