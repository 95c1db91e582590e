//! Memory service clients for Memgate.
//!
//! The real backend is the Mem0 HTTP API. When no API key is configured
//! the no-op backend is used instead: every search returns nothing and
//! every write is dropped, without errors. Memory is an enhancement of
//! the chat flow, never a hard dependency.

pub mod mem0;
pub mod noop;

pub use mem0::Mem0Client;
pub use noop::NoopMemory;

use memgate_config::AppConfig;
use memgate_core::MemoryService;
use std::sync::Arc;

/// Build the memory service from configuration.
///
/// Missing credential → disabled backend, never a runtime error.
pub fn build_from_config(config: &AppConfig) -> Arc<dyn MemoryService> {
    match &config.memory.api_key {
        Some(api_key) => Arc::new(Mem0Client::new(
            &config.memory.base_url,
            api_key,
            std::time::Duration::from_secs(config.memory.search_timeout_secs),
        )),
        None => {
            tracing::warn!("No memory API key configured — memory features disabled");
            Arc::new(NoopMemory)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_builds_noop() {
        let config = AppConfig::default();
        let service = build_from_config(&config);
        assert_eq!(service.name(), "none");
    }

    #[test]
    fn key_builds_mem0() {
        let mut config = AppConfig::default();
        config.memory.api_key = Some("m0-test".into());
        let service = build_from_config(&config);
        assert_eq!(service.name(), "mem0");
    }
}
