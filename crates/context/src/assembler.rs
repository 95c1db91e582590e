//! Context assembly — the per-request orchestration pipeline.
//!
//! For each inbound chat request, linearly:
//!
//! 1. Search the memory service for snippets relevant to the latest
//!    user utterance (failure degrades to an empty result).
//! 2. Format the snippets into a bounded context block.
//! 3. Prepend the block as a synthetic system message ahead of the
//!    conversation history.
//!
//! After the completion stream finishes, [`ContextAssembler::persist_exchange`]
//! stores the raw exchange back to the memory service, best-effort.
//!
//! Assembly is deterministic for a fixed search result: no random or
//! time-dependent logic participates in building the message list.

use memgate_core::memory::{
    MemoryMessage, MemoryQuery, MemoryService, MemorySnippet, MemoryWrite, MemoryWriteMetadata,
};
use memgate_core::message::{Message, Role};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shown in the synthetic system message when no snippet was retrieved,
/// so that message is always well-formed.
const NO_CONTEXT_SENTINEL: &str = "No relevant user context available.";

const CONTEXT_HEADER: &str = "User Context (from past conversations):";

/// At most this many snippets are rendered, best relevance first.
const MAX_SNIPPETS: usize = 5;

/// Tuning for the assembler, taken from configuration at startup.
#[derive(Debug, Clone)]
pub struct AssemblerSettings {
    /// Model identifier recorded in persistence metadata
    pub model: String,

    /// Maximum snippets requested per memory search
    pub search_limit: usize,

    /// Relevance threshold passed to the memory search
    pub search_threshold: f32,
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".into(),
            search_limit: 5,
            search_threshold: 0.1,
        }
    }
}

/// Builds the outgoing completion request context and persists exchanges.
///
/// Stateless per request: one assembler (holding an immutable memory
/// client) serves all concurrent requests.
pub struct ContextAssembler {
    memory: Arc<dyn MemoryService>,
    settings: AssemblerSettings,
}

impl ContextAssembler {
    pub fn new(memory: Arc<dyn MemoryService>, settings: AssemblerSettings) -> Self {
        Self { memory, settings }
    }

    pub fn settings(&self) -> &AssemblerSettings {
        &self.settings
    }

    /// Assemble the message list for the completion API.
    ///
    /// Searches memory with the content of the most recent `user` message
    /// (empty query when the conversation has none — never an error) and
    /// returns `[synthetic system message, ...messages]`. The input is
    /// never reordered, trimmed, or mutated here; the output is always
    /// exactly one message longer. Budget enforcement happens upstream.
    ///
    /// Every memory-search failure — network error, timeout, malformed
    /// response — is absorbed as an empty snippet list. Memory enhances
    /// the chat flow; it must never break it.
    pub async fn assemble(&self, messages: &[Message], user_id: &str) -> Vec<Message> {
        let last_user_text = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("");

        let snippets = self.search_memories(last_user_text, user_id).await;
        let context_block = format_memory_context(&snippets);

        let synthetic = Message::system(format!(
            "You are a helpful AI assistant. Here is relevant context from previous \
             conversations with this user:\n\n{context_block}\n\nUse this context to \
             provide personalized, contextual responses. If the context is relevant, \
             acknowledge what you remember about the user. If not directly relevant, \
             focus on the current question."
        ));

        let mut enhanced = Vec::with_capacity(messages.len() + 1);
        enhanced.push(synthetic);
        enhanced.extend_from_slice(messages);
        enhanced
    }

    async fn search_memories(&self, query_text: &str, user_id: &str) -> Vec<MemorySnippet> {
        let query = MemoryQuery {
            query: query_text.to_string(),
            user_id: user_id.to_string(),
            limit: self.settings.search_limit,
            threshold: self.settings.search_threshold,
        };

        match self.memory.search(query).await {
            Ok(snippets) => {
                debug!(count = snippets.len(), "Memory search returned snippets");
                snippets
            }
            Err(e) => {
                warn!(error = %e, "Memory search failed, continuing without context");
                Vec::new()
            }
        }
    }

    /// Persist a completed exchange to the memory service, best-effort.
    ///
    /// Filters to user/assistant turns, tags them with the user id and
    /// (when known) the conversation id as session correlator. The
    /// response has already been delivered when this runs, so failures
    /// are logged and swallowed.
    pub async fn persist_exchange(
        &self,
        messages: &[Message],
        user_id: &str,
        conversation_id: Option<&str>,
    ) {
        let turns: Vec<MemoryMessage> = messages
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .map(|m| MemoryMessage {
                role: m.role,
                content: m.content.clone(),
            })
            .collect();

        if turns.is_empty() {
            return;
        }

        let write = MemoryWrite {
            user_id: user_id.to_string(),
            run_id: conversation_id.map(String::from),
            metadata: MemoryWriteMetadata {
                timestamp: chrono::Utc::now(),
                conversation_id: conversation_id.map(String::from),
                model: self.settings.model.clone(),
                message_count: messages.len(),
            },
            messages: turns,
        };

        match self.memory.add(write).await {
            Ok(()) => debug!(user_id = %user_id, "Exchange persisted to memory"),
            Err(e) => warn!(error = %e, "Failed to persist exchange, response unaffected"),
        }
    }
}

/// Render retrieved snippets as a bounded, numbered context block.
///
/// Never returns an empty string: with no snippets the sentinel line is
/// returned instead. At most [`MAX_SNIPPETS`] entries are rendered, in
/// the service's order (best relevance first), each with its relevance
/// as a percentage with one decimal.
pub fn format_memory_context(snippets: &[MemorySnippet]) -> String {
    if snippets.is_empty() {
        return NO_CONTEXT_SENTINEL.to_string();
    }

    let lines: Vec<String> = snippets
        .iter()
        .take(MAX_SNIPPETS)
        .enumerate()
        .map(|(index, snippet)| {
            format!(
                "{}. {} (Relevance: {:.1}%)",
                index + 1,
                snippet.content,
                snippet.score * 100.0
            )
        })
        .collect();

    format!("{}\n{}", CONTEXT_HEADER, lines.join("\n"))
}
