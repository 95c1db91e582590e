//! MemoryService trait — the external long-term-memory boundary.
//!
//! The memory service stores short text "memories" per user and retrieves
//! them by semantic relevance. It is owned externally: this system only
//! consumes its search and write contracts. Snippets are read-only here,
//! ranked best-first by the service.

use crate::error::MemoryError;
use crate::message::Role;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One retrieved memory with its relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySnippet {
    /// Opaque service-side identifier
    pub id: String,

    /// The memory text
    pub content: String,

    /// Relevance score in [0, 1], assigned by the service
    pub score: f32,
}

/// A semantic search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryQuery {
    /// The search text (typically the latest user utterance)
    pub query: String,

    /// Which user's memories to search
    pub user_id: String,

    /// Maximum number of results
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Minimum relevance score threshold
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

fn default_limit() -> usize {
    5
}

fn default_threshold() -> f32 {
    0.1
}

impl MemoryQuery {
    pub fn new(query: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user_id: user_id.into(),
            limit: default_limit(),
            threshold: default_threshold(),
        }
    }
}

/// One message of an exchange, in the service's write shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMessage {
    pub role: Role,
    pub content: String,
}

/// A fire-and-forget write of a completed exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryWrite {
    /// User/assistant turns only — system messages carry no memories
    pub messages: Vec<MemoryMessage>,

    /// Which user these memories belong to
    pub user_id: String,

    /// Session correlator, present when the conversation is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    /// Write metadata recorded alongside the memories
    pub metadata: MemoryWriteMetadata,
}

/// Metadata attached to a memory write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryWriteMetadata {
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    /// Model that produced the assistant turns
    pub model: String,

    pub message_count: usize,
}

/// The memory service boundary.
///
/// Implementations are immutable and reusable across requests. A missing
/// credential is expressed as a disabled implementation whose operations
/// are no-ops, never as a runtime error.
#[async_trait]
pub trait MemoryService: Send + Sync {
    /// The backend name (e.g., "mem0", "none").
    fn name(&self) -> &str;

    /// Search memories by semantic relevance, best match first.
    async fn search(
        &self,
        query: MemoryQuery,
    ) -> std::result::Result<Vec<MemorySnippet>, MemoryError>;

    /// Persist a completed exchange. No payload is awaited beyond
    /// success/failure for logging.
    async fn add(&self, write: MemoryWrite) -> std::result::Result<(), MemoryError>;
}
