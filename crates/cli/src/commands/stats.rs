//! `memgate stats` — token usage report for a saved conversation.
//!
//! Reads a JSON array of `{role, content}` messages (the shape browser
//! clients POST to `/chat`) and reports how it fits the history budget.

use memgate_config::AppConfig;
use memgate_context::budget;
use memgate_core::message::{Message, Role};
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
struct StoredMessage {
    role: Role,
    content: String,
}

// Same bound the config layer enforces for max_history_tokens.
fn validate_budget(budget: usize) -> Result<usize, String> {
    if budget == 0 {
        return Err("--budget must be > 0".into());
    }
    Ok(budget)
}

pub fn run(file: &Path, budget_override: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
    let stored: Vec<StoredMessage> = serde_json::from_str(&raw)
        .map_err(|e| format!("{} is not a JSON message array: {e}", file.display()))?;

    let messages: Vec<Message> = stored
        .into_iter()
        .map(|m| Message::new(m.role, m.content))
        .collect();

    let max_tokens = match budget_override {
        Some(b) => validate_budget(b)?,
        None => AppConfig::load()?.context.max_history_tokens,
    };

    let stats = budget::usage_stats(&messages, max_tokens);

    println!("Token Usage");
    println!("─────────────────────────────────────");
    println!("  Messages:        {}", messages.len());
    println!("  Original tokens: {}", stats.original_tokens);
    println!("  Retained tokens: {}", stats.retained_tokens);
    println!("  Budget:          {}", stats.max_tokens);
    println!("  Utilization:     {}%", stats.utilization_percent);
    if stats.was_trimmed {
        println!(
            "  Trimmed:         yes ({} message(s) would be dropped)",
            stats.messages_dropped
        );
    } else {
        println!("  Trimmed:         no");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_budget_rejected() {
        assert!(validate_budget(0).is_err());
        assert_eq!(validate_budget(3500), Ok(3500));
    }
}
