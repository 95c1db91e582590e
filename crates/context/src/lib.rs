//! Context-window budgeting and memory-context assembly.
//!
//! Two cooperating components:
//!
//! - [`budget`] — pure token accounting for a message sequence and
//!   budget enforcement via most-recent-first retention (FIFO eviction
//!   of the oldest messages).
//! - [`assembler`] — per-request orchestration: retrieve relevant
//!   memories for the latest user utterance, inject them as a synthetic
//!   leading system message, and persist the exchange afterward.

pub mod assembler;
pub mod budget;

pub use assembler::{AssemblerSettings, ContextAssembler};
pub use budget::{UsageStats, count_messages_tokens, count_tokens, trim_to_budget, usage_stats};
