//! Request handlers for the gateway.
//!
//! `POST /chat` is the whole product surface: validate, assemble context,
//! relay the provider stream as a chunked plain-text body, then persist
//! the exchange in the background. `GET /health` reports liveness and
//! which backends are wired in.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

use crate::SharedState;
use memgate_context::budget;
use memgate_core::message::{Attachment, ConversationId, Message, Role};
use memgate_core::provider::{CompletionRequest, StreamChunk};

/// Incoming chat request. Field aliases accept the camelCase names that
/// browser clients send.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,

    /// Model override for this request
    pub model: Option<String>,

    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,

    #[serde(default, alias = "conversationId")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub role: Role,
    pub content: String,

    /// Attachment references, carried opaquely into the domain message
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: String,
}

fn error_response(
    status: StatusCode,
    error: &str,
    details: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            details: details.into(),
        }),
    )
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider: String,
    pub memory: String,
}

pub async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        provider: state.provider.name().to_string(),
        memory: state.memory_backend.clone(),
    })
}

/// `POST /chat` — send a conversation, receive the assistant reply as a
/// chunked plain-text stream.
///
/// The response starts as soon as the provider accepts the request;
/// provider failures after that point end the stream with whatever text
/// was already delivered. The memory write happens after the stream
/// completes and never delays or fails the response.
pub async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    if payload.messages.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Invalid request",
            "messages array is required and must not be empty",
        ));
    }

    let user_id = match payload.user_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => {
            warn!(
                fallback = %state.default_user_id,
                "Chat request without user id, memories will pool under the fallback"
            );
            state.default_user_id.clone()
        }
    };

    let messages: Vec<Message> = payload
        .messages
        .iter()
        .map(|m| {
            m.attachments
                .iter()
                .cloned()
                .fold(Message::new(m.role, &m.content), Message::with_attachment)
        })
        .collect();

    let model = payload.model.unwrap_or_else(|| state.model.clone());
    info!(
        model = %model,
        messages = messages.len(),
        user_id = %user_id,
        "Chat request"
    );

    // Enforce the history budget before memory injection; the synthetic
    // system message rides on top of it.
    let stats = budget::usage_stats(&messages, state.max_history_tokens);
    let history = if state.trim_history && stats.was_trimmed {
        info!(
            dropped = stats.messages_dropped,
            retained_tokens = stats.retained_tokens,
            budget = stats.max_tokens,
            "History over budget, dropping oldest messages"
        );
        budget::trim_to_budget(&messages, state.max_history_tokens)
    } else {
        messages.clone()
    };

    let enhanced = state.assembler.assemble(&history, &user_id).await;

    let request = CompletionRequest {
        model,
        messages: enhanced,
        temperature: state.temperature,
        max_tokens: state.max_tokens,
    };

    let mut chunks = match state.provider.stream(request).await {
        Ok(rx) => rx,
        Err(e) => {
            error!(error = %e, "Provider rejected chat request");
            return Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process chat request",
                e.to_string(),
            ));
        }
    };

    // Relay provider chunks to the client through a forwarder task. The
    // task outlives the handler and runs the memory write once the
    // provider signals completion.
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, Infallible>>(64);
    let assembler = Arc::clone(&state.assembler);
    let conversation_id: Option<ConversationId> =
        payload.conversation_id.map(ConversationId::from);

    tokio::spawn(async move {
        let mut assistant_text = String::new();
        let mut completed = false;

        while let Some(chunk) = chunks.recv().await {
            match chunk {
                Ok(StreamChunk {
                    content, done, usage, ..
                }) => {
                    if let Some(text) = content {
                        assistant_text.push_str(&text);
                        if tx.send(Ok(Bytes::from(text))).await.is_err() {
                            // Client went away; stop reading the provider.
                            warn!("Client disconnected mid-stream");
                            return;
                        }
                    }
                    if let Some(usage) = usage {
                        info!(
                            prompt_tokens = usage.prompt_tokens,
                            completion_tokens = usage.completion_tokens,
                            "Completion usage"
                        );
                    }
                    if done {
                        completed = true;
                        break;
                    }
                }
                Err(e) => {
                    // End the stream; the client keeps the partial text.
                    error!(error = %e, "Provider stream interrupted");
                    break;
                }
            }
        }
        drop(tx);

        if completed && !assistant_text.is_empty() {
            let mut exchange = messages;
            exchange.push(Message::assistant(assistant_text));
            assembler
                .persist_exchange(
                    &exchange,
                    &user_id,
                    conversation_id.as_ref().map(ConversationId::as_str),
                )
                .await;
        }
    });

    let body = Body::from_stream(ReceiverStream::new(rx));
    let response = (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response();

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GatewayState, build_router};
    use async_trait::async_trait;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use memgate_context::{AssemblerSettings, ContextAssembler};
    use memgate_core::error::{MemoryError, ProviderError};
    use memgate_core::memory::{MemoryQuery, MemoryService, MemorySnippet, MemoryWrite};
    use memgate_core::provider::CompletionProvider;
    use tower::ServiceExt;

    struct ScriptedProvider {
        deltas: Vec<&'static str>,
        fail_on_connect: bool,
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn stream(
            &self,
            _request: CompletionRequest,
        ) -> Result<
            tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>,
            ProviderError,
        > {
            if self.fail_on_connect {
                return Err(ProviderError::AuthenticationFailed(
                    "invalid API key".into(),
                ));
            }
            let (tx, rx) = tokio::sync::mpsc::channel(16);
            let deltas = self.deltas.clone();
            tokio::spawn(async move {
                for delta in deltas {
                    let _ = tx
                        .send(Ok(StreamChunk {
                            content: Some(delta.to_string()),
                            done: false,
                            usage: None,
                        }))
                        .await;
                }
                let _ = tx
                    .send(Ok(StreamChunk {
                        content: None,
                        done: true,
                        usage: None,
                    }))
                    .await;
            });
            Ok(rx)
        }
    }

    struct RecordingMemory {
        writes: tokio::sync::Mutex<Vec<MemoryWrite>>,
        notify: tokio::sync::Notify,
    }

    impl RecordingMemory {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                writes: tokio::sync::Mutex::new(Vec::new()),
                notify: tokio::sync::Notify::new(),
            })
        }
    }

    #[async_trait]
    impl MemoryService for RecordingMemory {
        fn name(&self) -> &str {
            "recording"
        }

        async fn search(&self, _query: MemoryQuery) -> Result<Vec<MemorySnippet>, MemoryError> {
            Ok(Vec::new())
        }

        async fn add(&self, write: MemoryWrite) -> Result<(), MemoryError> {
            self.writes.lock().await.push(write);
            self.notify.notify_one();
            Ok(())
        }
    }

    fn test_state(provider: ScriptedProvider, memory: Arc<RecordingMemory>) -> SharedState {
        let backend = memory.name().to_string();
        let assembler = Arc::new(ContextAssembler::new(
            memory,
            AssemblerSettings::default(),
        ));
        Arc::new(GatewayState {
            provider: Arc::new(provider),
            assembler,
            memory_backend: backend,
            model: "gpt-4o".into(),
            temperature: 0.7,
            max_tokens: Some(1000),
            default_user_id: "anonymous".into(),
            max_history_tokens: 3500,
            trim_history: true,
        })
    }

    fn chat_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_backends() {
        let app = build_router(test_state(
            ScriptedProvider {
                deltas: vec![],
                fail_on_connect: false,
            },
            RecordingMemory::new(),
        ));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["provider"], "scripted");
        assert_eq!(json["memory"], "recording");
    }

    #[tokio::test]
    async fn empty_messages_rejected_with_400() {
        let app = build_router(test_state(
            ScriptedProvider {
                deltas: vec!["never"],
                fail_on_connect: false,
            },
            RecordingMemory::new(),
        ));

        let response = app
            .oneshot(chat_request(serde_json::json!({ "messages": [] })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "Invalid request");
    }

    #[tokio::test]
    async fn chat_streams_provider_deltas() {
        let app = build_router(test_state(
            ScriptedProvider {
                deltas: vec!["Hello", ", ", "world"],
                fail_on_connect: false,
            },
            RecordingMemory::new(),
        ));

        let response = app
            .oneshot(chat_request(serde_json::json!({
                "messages": [{ "role": "user", "content": "Greet me" }],
                "userId": "usr_1"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.starts_with("text/plain"))
        );

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"Hello, world");
    }

    #[tokio::test]
    async fn provider_rejection_maps_to_500() {
        let app = build_router(test_state(
            ScriptedProvider {
                deltas: vec![],
                fail_on_connect: true,
            },
            RecordingMemory::new(),
        ));

        let response = app
            .oneshot(chat_request(serde_json::json!({
                "messages": [{ "role": "user", "content": "Hi" }]
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "Failed to process chat request");
        assert!(json["details"].as_str().unwrap().contains("invalid API key"));
    }

    #[tokio::test]
    async fn completed_exchange_is_persisted() {
        let memory = RecordingMemory::new();
        let app = build_router(test_state(
            ScriptedProvider {
                deltas: vec!["The answer is 4."],
                fail_on_connect: false,
            },
            memory.clone(),
        ));

        let response = app
            .oneshot(chat_request(serde_json::json!({
                "messages": [{ "role": "user", "content": "What is 2 + 2?" }],
                "userId": "usr_1",
                "conversationId": "conv_9"
            })))
            .await
            .unwrap();
        let _ = response.into_body().collect().await.unwrap();

        // The write runs in the forwarder task after the body closes.
        tokio::time::timeout(std::time::Duration::from_secs(1), memory.notify.notified())
            .await
            .expect("memory write never happened");

        let writes = memory.writes.lock().await;
        assert_eq!(writes.len(), 1);
        let write = &writes[0];
        assert_eq!(write.user_id, "usr_1");
        assert_eq!(write.run_id.as_deref(), Some("conv_9"));
        assert_eq!(write.messages.len(), 2);
        assert_eq!(write.messages[1].content, "The answer is 4.");
    }

    struct CapturingProvider {
        seen_messages: Arc<std::sync::Mutex<Option<Vec<Message>>>>,
    }

    #[async_trait]
    impl CompletionProvider for CapturingProvider {
        fn name(&self) -> &str {
            "capturing"
        }

        async fn stream(
            &self,
            request: CompletionRequest,
        ) -> Result<
            tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>,
            ProviderError,
        > {
            *self.seen_messages.lock().unwrap() = Some(request.messages.clone());
            let (tx, rx) = tokio::sync::mpsc::channel(1);
            let _ = tx
                .send(Ok(StreamChunk {
                    content: Some("ok".into()),
                    done: true,
                    usage: None,
                }))
                .await;
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn over_budget_history_is_trimmed_before_dispatch() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let memory = RecordingMemory::new();
        let assembler = Arc::new(ContextAssembler::new(
            memory.clone() as Arc<dyn MemoryService>,
            AssemblerSettings::default(),
        ));

        // Budget that fits exactly one of three equally sized messages.
        let probe = Message::user("equally sized message number 0");
        let per_message = budget::count_message_tokens(&probe);

        let state = Arc::new(GatewayState {
            provider: Arc::new(CapturingProvider {
                seen_messages: seen.clone(),
            }),
            assembler,
            memory_backend: "recording".into(),
            model: "gpt-4o".into(),
            temperature: 0.7,
            max_tokens: Some(1000),
            default_user_id: "anonymous".into(),
            max_history_tokens: per_message,
            trim_history: true,
        });
        let app = build_router(state);

        let response = app
            .oneshot(chat_request(serde_json::json!({
                "messages": [
                    { "role": "user", "content": "equally sized message number 0" },
                    { "role": "user", "content": "equally sized message number 1" },
                    { "role": "user", "content": "equally sized message number 2" }
                ],
                "userId": "usr_1"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let _ = response.into_body().collect().await.unwrap();

        // One retained history message plus the synthetic system message.
        let dispatched = seen.lock().unwrap().take().expect("provider never called");
        assert_eq!(dispatched.len(), 2);
        assert_eq!(dispatched[1].content, "equally sized message number 2");
    }

    #[tokio::test]
    async fn attachments_carried_through_to_provider() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let memory = RecordingMemory::new();
        let assembler = Arc::new(ContextAssembler::new(
            memory.clone() as Arc<dyn MemoryService>,
            AssemblerSettings::default(),
        ));
        let state = Arc::new(GatewayState {
            provider: Arc::new(CapturingProvider {
                seen_messages: seen.clone(),
            }),
            assembler,
            memory_backend: "recording".into(),
            model: "gpt-4o".into(),
            temperature: 0.7,
            max_tokens: Some(1000),
            default_user_id: "anonymous".into(),
            max_history_tokens: 3500,
            trim_history: true,
        });
        let app = build_router(state);

        let response = app
            .oneshot(chat_request(serde_json::json!({
                "messages": [{
                    "role": "user",
                    "content": "What is in this image?",
                    "attachments": [{
                        "id": "att_1",
                        "name": "photo.png",
                        "size": 2048,
                        "content_type": "image/png",
                        "url": "https://cdn.example.com/photo.png"
                    }]
                }],
                "userId": "usr_1"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let _ = response.into_body().collect().await.unwrap();

        let dispatched = seen.lock().unwrap().take().expect("provider never called");
        // [synthetic system message, user message]
        assert_eq!(dispatched.len(), 2);
        let attachments = &dispatched[1].attachments;
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].id, "att_1");
        assert_eq!(attachments[0].content_type, "image/png");
    }

    #[tokio::test]
    async fn missing_user_id_falls_back_to_default() {
        let memory = RecordingMemory::new();
        let app = build_router(test_state(
            ScriptedProvider {
                deltas: vec!["ok"],
                fail_on_connect: false,
            },
            memory.clone(),
        ));

        let response = app
            .oneshot(chat_request(serde_json::json!({
                "messages": [{ "role": "user", "content": "Hello" }]
            })))
            .await
            .unwrap();
        let _ = response.into_body().collect().await.unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(1), memory.notify.notified())
            .await
            .expect("memory write never happened");

        let writes = memory.writes.lock().await;
        assert_eq!(writes[0].user_id, "anonymous");
    }
}
