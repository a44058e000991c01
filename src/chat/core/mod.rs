//! Core types shared by the chat subsystem.

pub mod config;
pub mod errors;
pub mod ids;
pub mod records;

pub use config::{ChatConfig, ResponderConfig};
pub use errors::{ChatError, ChatResult};
pub use ids::ConversationId;
pub use records::{Conversation, Message, Sender};
