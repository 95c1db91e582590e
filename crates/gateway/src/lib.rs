//! HTTP gateway for Memgate.
//!
//! Exposes the streaming chat endpoint plus a health check. The gateway
//! itself is thin: it validates the request, hands the conversation to
//! the context assembler, relays the provider stream to the client, and
//! kicks off the fire-and-forget memory write once the stream ends.
//!
//! Built on Axum for high performance async HTTP.

pub mod routes;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use memgate_config::AppConfig;
use memgate_context::{AssemblerSettings, ContextAssembler};
use memgate_core::provider::CompletionProvider;

/// Shared application state for the gateway.
///
/// Everything in here is immutable after startup, so a plain `Arc`
/// (no lock) is shared across all request handlers.
pub struct GatewayState {
    pub provider: Arc<dyn CompletionProvider>,
    pub assembler: Arc<ContextAssembler>,
    pub memory_backend: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub default_user_id: String,
    pub max_history_tokens: usize,
    /// When `false` the budget is only reported, never enforced.
    pub trim_history: bool,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
///
/// Layers applied:
/// - CORS (permissive: the gateway fronts browser clients on other origins)
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(routes::health_handler))
        .route("/chat", post(routes::chat_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// Builds the provider, memory client, and assembler once and shares
/// them via `Arc` across all requests.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = memgate_providers::build_from_config(&config)
        .ok_or("No completion provider configured — set an API key")?;
    let memory = memgate_memory::build_from_config(&config);
    let memory_backend = memory.name().to_string();

    let assembler = Arc::new(ContextAssembler::new(
        memory,
        AssemblerSettings {
            model: config.completion.model.clone(),
            search_limit: config.memory.search_limit,
            search_threshold: config.memory.search_threshold,
        },
    ));

    let state = Arc::new(GatewayState {
        provider,
        assembler,
        memory_backend,
        model: config.completion.model.clone(),
        temperature: config.completion.temperature,
        max_tokens: Some(config.completion.max_tokens),
        default_user_id: config.gateway.default_user_id.clone(),
        max_history_tokens: config.context.max_history_tokens,
        trim_history: config.context.trim_history,
    });

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
