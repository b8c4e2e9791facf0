//! Conversation messages and the append-only transcript.
//!
//! The transcript is owned by the calling session. The pipeline only ever
//! reads a window of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who said a message.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    /// Label used when a transcript is embedded in a prompt.
    pub fn prompt_label(self) -> &'static str {
        match self {
            Speaker::User => "User",
            Speaker::Assistant => "AI",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConversationMessage {
    pub role: Speaker,
    pub text: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Speaker::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Speaker::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Speaker::User
    }
}

/// Append-only conversation history for one module.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<ConversationMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ConversationMessage) {
        self.messages.push(message);
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(ConversationMessage::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.push(ConversationMessage::assistant(text));
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of user messages so far; the CLI uses this as the turn index.
    pub fn user_turns(&self) -> u32 {
        self.messages.iter().filter(|m| m.is_user()).count() as u32
    }
}

impl From<Vec<ConversationMessage>> for Transcript {
    fn from(messages: Vec<ConversationMessage>) -> Self {
        Self { messages }
    }
}

/// The most recent `size` messages.
pub fn window(messages: &[ConversationMessage], size: usize) -> &[ConversationMessage] {
    let start = messages.len().saturating_sub(size);
    &messages[start..]
}

/// Format messages as `User: ...` / `AI: ...` lines.
pub fn format_for_prompt(messages: &[ConversationMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.prompt_label(), m.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}
