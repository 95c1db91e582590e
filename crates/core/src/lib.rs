//! # Memgate Core
//!
//! Domain types, traits, and error definitions for the Memgate chat gateway.
//! This crate has **zero framework dependencies** — it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The two external collaborators — the completion API and the memory
//! service — are defined as traits here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod memory;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use error::{Error, MemoryError, ProviderError, Result};
pub use memory::{MemoryQuery, MemoryService, MemorySnippet, MemoryWrite};
pub use message::{Attachment, Conversation, ConversationId, Message, Role};
pub use provider::{CompletionProvider, CompletionRequest, StreamChunk, Usage};
