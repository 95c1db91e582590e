//! Message and Conversation domain types.
//!
//! These are the core value objects that flow through the system:
//! the client sends a message list → the assembler enriches it →
//! the provider streams a completion back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
///
/// Immutable after creation — a message never changes role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (including the synthetic memory-context message)
    System,
    /// The end user
    User,
    /// The AI assistant
    Assistant,
}

impl Role {
    /// The wire-format role name, as sent to the completion API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A file attachment referenced by a message.
///
/// Carried opaquely: the gateway forwards attachment references but never
/// interprets their payloads. At least one of `data` (inline data URL) or
/// `url` (remote location) is expected when the type requires rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Unique attachment ID
    pub id: String,

    /// Display name (original filename)
    pub name: String,

    /// Size in bytes
    pub size: u64,

    /// MIME type (e.g. "image/png")
    pub content_type: String,

    /// Inline payload as a data URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// Remote URL (CDN location)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content (may be empty; appended to while an assistant
    /// response is streaming)
    pub content: String,

    /// Attachment references (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message with an explicit role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            attachments: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Attach a file reference to this message.
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// A conversation is an ordered, append-only sequence of messages.
///
/// Message order is the conversation's canonical order. Truncation only
/// happens on edit-and-regenerate, which deletes the edited message's
/// successors (see [`Conversation::truncate_after`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Ordered messages
    pub messages: Vec<Message>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,

    /// Optional title (derived from the first user message if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            title: None,
        }
    }

    /// Add a message to the conversation.
    ///
    /// Derives the title from the first user message when not set.
    pub fn push(&mut self, message: Message) {
        if self.title.is_none() && message.role == Role::User {
            self.title = Some(derive_title(&message.content));
        }
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Delete all messages after the one with the given ID.
    ///
    /// Used by the edit-and-regenerate flow: the edited message stays,
    /// its successors are dropped. Returns `false` when the ID is not
    /// present (the conversation is left untouched).
    pub fn truncate_after(&mut self, message_id: &str) -> bool {
        match self.messages.iter().position(|m| m.id == message_id) {
            Some(idx) => {
                self.messages.truncate(idx + 1);
                self.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

const TITLE_MAX_CHARS: usize = 40;

fn derive_title(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    format!("{}…", cut.trim_end())
}
