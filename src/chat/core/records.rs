//! Persisted conversation and message records.
//!
//! Field names on the wire follow the storage column names, so the JSON a
//! client receives is the row it would read from the database.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::core::errors::ChatError;
use crate::chat::core::ids::ConversationId;

/// A conversation header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier.
    #[serde(rename = "conversation_id")]
    pub id: ConversationId,
    /// Creation time.
    #[serde(rename = "conversation_create_time")]
    pub created_at: DateTime<Utc>,
    /// Optional free-form display title.
    #[serde(rename = "conversation_title")]
    pub title: Option<String>,
}

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// Content typed by the user.
    User,
    /// Generated reply.
    Agent,
}

impl Sender {
    /// Storage and wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sender {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "agent" => Ok(Self::Agent),
            other => Err(ChatError::InvalidRecord(format!("unknown sender: {other}"))),
        }
    }
}

/// A single message in a conversation. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned, monotonically increasing id.
    #[serde(rename = "record_id")]
    pub id: i64,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Author.
    #[serde(rename = "message_sender")]
    pub sender: Sender,
    /// Message text.
    #[serde(rename = "message_content")]
    pub content: String,
    /// Time the message was stored.
    #[serde(rename = "message_send_time")]
    pub sent_at: DateTime<Utc>,
}
