//! JSON frames exchanged over the message channel.

use serde::{Deserialize, Serialize};

use crate::chat::core::records::Message;

/// Acknowledgement text sent once a channel is registered.
pub const CONNECTED: &str = "connection established";
/// Sent when an inbound frame has no usable content.
pub const EMPTY_CONTENT: &str = "message content must not be empty";
/// Sent when handling a message fails after validation.
pub const PROCESSING_FAILED: &str = "failed to process message";

/// Close reason when no conversation id was supplied.
pub const MISSING_CONVERSATION: &str = "missing conversation id";
/// Close reason when the conversation does not exist.
pub const UNKNOWN_CONVERSATION: &str = "conversation not found";
/// Close reason when the conversation could not be checked.
pub const INTERNAL_ERROR: &str = "internal server error";

/// Outbound envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// Channel accepted.
    Connection {
        /// Human-readable acknowledgement.
        message: String,
    },
    /// A persisted message, user or agent.
    Message {
        /// The stored record.
        data: Message,
    },
    /// Something went wrong with the last inbound frame.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl Envelope {
    /// Acknowledgement envelope.
    #[must_use]
    pub fn connected() -> Self {
        Self::Connection {
            message: CONNECTED.to_string(),
        }
    }

    /// Error envelope.
    #[must_use]
    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }
}

/// Inbound frame sent by clients.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Inbound {
    /// Text to post. Missing and empty are both rejected.
    #[serde(default)]
    pub content: Option<String>,
}

impl Inbound {
    /// Non-empty content, if any.
    #[must_use]
    pub fn into_content(self) -> Option<String> {
        self.content.filter(|c| !c.is_empty())
    }
}
