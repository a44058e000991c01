//! Persistent storage for conversations and messages.

pub mod chat_store;

pub use chat_store::{ChatStore, SqliteChatStore, StoreFuture};
