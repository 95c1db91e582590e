//! Mem0 HTTP client.
//!
//! Consumes the hosted Mem0 REST API:
//! - `POST /v1/memories/search/` — semantic search, best match first
//! - `POST /v1/memories/` — store an exchange
//!
//! Searches carry a short per-call timeout; expiry is reported as
//! [`MemoryError::Timeout`] and treated by the caller exactly like any
//! other search failure (empty snippet list). Writes use the default
//! client timeout — they run after the response has been delivered, so
//! latency there is invisible to the user.

use async_trait::async_trait;
use memgate_core::error::MemoryError;
use memgate_core::memory::{MemoryQuery, MemoryService, MemorySnippet, MemoryWrite};
use serde::Deserialize;
use tracing::{debug, warn};

/// Client for the Mem0 memory service.
///
/// Immutable and reusable across requests.
pub struct Mem0Client {
    base_url: String,
    api_key: String,
    search_timeout: std::time::Duration,
    client: reqwest::Client,
}

impl Mem0Client {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        search_timeout: std::time::Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            search_timeout,
            client,
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> MemoryError {
        if e.is_timeout() {
            MemoryError::Timeout {
                timeout_secs: self.search_timeout.as_secs(),
            }
        } else {
            MemoryError::SearchFailed(e.to_string())
        }
    }
}

#[async_trait]
impl MemoryService for Mem0Client {
    fn name(&self) -> &str {
        "mem0"
    }

    async fn search(&self, query: MemoryQuery) -> Result<Vec<MemorySnippet>, MemoryError> {
        let url = format!("{}/v1/memories/search/", self.base_url);

        let body = serde_json::json!({
            "query": query.query,
            "user_id": query.user_id,
            "limit": query.limit,
            "threshold": query.threshold,
        });

        debug!(user_id = %query.user_id, limit = query.limit, "Searching memories");

        let response = self
            .client
            .post(&url)
            .timeout(self.search_timeout)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(MemoryError::SearchFailed(format!(
                "status {status}: {error_body}"
            )));
        }

        let results: Vec<SearchResult> = response
            .json()
            .await
            .map_err(|e| MemoryError::MalformedResponse(e.to_string()))?;

        let snippets = results
            .into_iter()
            .map(|r| MemorySnippet {
                id: r.id,
                content: r.memory,
                score: r.score,
            })
            .collect();

        Ok(snippets)
    }

    async fn add(&self, write: MemoryWrite) -> Result<(), MemoryError> {
        let url = format!("{}/v1/memories/", self.base_url);

        let mut body = serde_json::json!({
            "messages": write.messages,
            "user_id": write.user_id,
            "metadata": {
                "timestamp": write.metadata.timestamp.to_rfc3339(),
                "model": write.metadata.model,
                "message_count": write.metadata.message_count,
            },
        });
        if let Some(conv_id) = &write.metadata.conversation_id {
            body["metadata"]["conversation_id"] = serde_json::json!(conv_id);
        }
        if let Some(run_id) = &write.run_id {
            body["run_id"] = serde_json::json!(run_id);
        }

        debug!(
            user_id = %write.user_id,
            message_count = write.messages.len(),
            "Storing exchange"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| MemoryError::WriteFailed(e.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Memory write rejected");
            return Err(MemoryError::WriteFailed(format!(
                "status {status}: {error_body}"
            )));
        }

        Ok(())
    }
}

/// One search hit in the service's response shape.
#[derive(Debug, Deserialize)]
struct SearchResult {
    id: String,
    memory: String,
    #[serde(default)]
    score: f32,
}
