//! Chatter: an unattended chat participant that reads a channel, generates a
//! short in-character message with an LLM, and posts it back on a random timer.

pub mod agent;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod messaging;
pub mod scheduler;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};

/// Platform message identifier. Opaque to everything but the adapter.
pub type MessageId = String;

/// A single channel message, normalized from the platform's shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub author: String,
    /// Platform user id of the author, when known.
    #[serde(default)]
    pub author_id: Option<String>,
    pub text: String,
}

impl ChatMessage {
    pub fn new(id: impl Into<String>, author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            author_id: None,
            text: text.into(),
        }
    }

    /// `author: text`, the form used in prompts.
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.author, self.text)
    }
}

/// The identity behind the chat credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotIdentity {
    pub id: String,
    pub username: String,
}

/// Outbound message: text plus an optional reply reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub text: String,
    pub reply_to: Option<MessageId>,
}
