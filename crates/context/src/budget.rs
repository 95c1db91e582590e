//! Token accounting and budget enforcement.
//!
//! Counts use the model's own BPE encoding (`o200k_base`, the GPT-4o
//! vocabulary) so the numbers match what the completion API bills for.
//! If the encoder cannot be constructed, a ~4-characters-per-token
//! heuristic takes over; the heuristic never fails, for any input.
//!
//! All functions here are deterministic and side-effect free.

use memgate_core::message::Message;
use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

/// Wire-format framing cost per message in the completion API:
/// role name markers, delimiters, and separators.
const MESSAGE_OVERHEAD: usize = 4;

fn encoder() -> Option<&'static CoreBPE> {
    static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();
    ENCODER
        .get_or_init(|| tiktoken_rs::o200k_base().ok())
        .as_ref()
}

/// Heuristic fallback: 1 token ≈ 4 characters, rounded up.
fn approximate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Count the tokens the given text occupies in the model's encoding.
///
/// Falls back to the character heuristic when the encoder is
/// unavailable. `count_tokens("")` is always 0.
pub fn count_tokens(text: &str) -> usize {
    match encoder() {
        Some(bpe) => bpe.encode_ordinary(text).len(),
        None => approximate_tokens(text),
    }
}

/// Token cost of a single message: content + role name + framing overhead.
pub fn count_message_tokens(message: &Message) -> usize {
    count_tokens(&message.content) + count_tokens(message.role.as_str()) + MESSAGE_OVERHEAD
}

/// Total token cost of a message sequence. 0 for an empty sequence.
pub fn count_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(count_message_tokens).sum()
}

/// Trim a message sequence to fit within `max_tokens`, keeping the most
/// recent messages.
///
/// Already within budget → the input is returned unchanged. Otherwise
/// messages are taken newest-first until the next one would exceed the
/// budget; accumulation then stops, so eviction is strictly FIFO on the
/// discarded prefix — older messages are never selectively skipped over.
/// Relative order is preserved in the result.
///
/// A non-empty input never trims to nothing: when even the newest
/// message alone exceeds the budget, that message is returned by itself.
/// This is accepted over-budget behavior, not an error — dropping the
/// user's latest turn would be worse than exceeding the limit.
pub fn trim_to_budget(messages: &[Message], max_tokens: usize) -> Vec<Message> {
    if messages.is_empty() || count_messages_tokens(messages) <= max_tokens {
        return messages.to_vec();
    }

    let mut retained: Vec<Message> = Vec::new();
    let mut used = 0;

    for message in messages.iter().rev() {
        let cost = count_message_tokens(message);
        if used + cost > max_tokens {
            break;
        }
        retained.push(message.clone());
        used += cost;
    }

    // Restore chronological order (we collected newest-first).
    retained.reverse();

    if retained.is_empty() {
        // Newest message alone is over budget. Keep it anyway.
        retained.push(messages[messages.len() - 1].clone());
    }

    retained
}

/// A read-only budget report for display and monitoring.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct UsageStats {
    /// Tokens in the full, untrimmed sequence
    pub original_tokens: usize,
    /// Tokens in the sequence after budget enforcement
    pub retained_tokens: usize,
    /// The budget applied
    pub max_tokens: usize,
    /// Messages evicted by the budget
    pub messages_dropped: usize,
    /// `retained / max`, as a rounded percentage
    pub utilization_percent: u32,
    /// Whether any message was evicted
    pub was_trimmed: bool,
}

/// Compute usage statistics for a sequence under the given budget.
pub fn usage_stats(messages: &[Message], max_tokens: usize) -> UsageStats {
    let original_tokens = count_messages_tokens(messages);
    let retained = trim_to_budget(messages, max_tokens);
    let retained_tokens = count_messages_tokens(&retained);
    let messages_dropped = messages.len() - retained.len();

    // A zero budget would divide to infinity; report 0% instead.
    let utilization_percent = if max_tokens == 0 {
        0
    } else {
        ((retained_tokens as f64 / max_tokens as f64) * 100.0).round() as u32
    };

    UsageStats {
        original_tokens,
        retained_tokens,
        max_tokens,
        messages_dropped,
        utilization_percent,
        was_trimmed: messages_dropped > 0,
    }
}
