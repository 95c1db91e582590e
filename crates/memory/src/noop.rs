//! No-op memory backend — used when no memory credential is configured.

use async_trait::async_trait;
use memgate_core::error::MemoryError;
use memgate_core::memory::{MemoryQuery, MemoryService, MemorySnippet, MemoryWrite};

/// A memory service that stores nothing and finds nothing.
pub struct NoopMemory;

#[async_trait]
impl MemoryService for NoopMemory {
    fn name(&self) -> &str {
        "none"
    }

    async fn search(&self, _query: MemoryQuery) -> Result<Vec<MemorySnippet>, MemoryError> {
        Ok(Vec::new())
    }

    async fn add(&self, _write: MemoryWrite) -> Result<(), MemoryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_returns_nothing() {
        let service = NoopMemory;
        let results = service
            .search(MemoryQuery::new("anything", "usr_1"))
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
