//! Completion API clients for Memgate.
//!
//! The only implementation is the OpenAI-compatible client, which covers
//! OpenAI itself plus every endpoint exposing the same
//! `/v1/chat/completions` contract.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use memgate_config::AppConfig;
use memgate_core::CompletionProvider;
use std::sync::Arc;

/// Build the completion provider from configuration.
///
/// Returns `None` when no API key is configured — the gateway refuses to
/// start without one, since the completion API is a hard dependency.
pub fn build_from_config(config: &AppConfig) -> Option<Arc<dyn CompletionProvider>> {
    let api_key = config.completion.api_key.clone()?;
    Some(Arc::new(OpenAiCompatProvider::new(
        "openai",
        &config.completion.base_url,
        api_key,
        std::time::Duration::from_secs(config.completion.timeout_secs),
    )))
}
