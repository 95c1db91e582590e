//! Configuration loading, validation, and management for Memgate.
//!
//! Loads configuration from `~/.memgate/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.memgate/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Completion API configuration
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Memory service configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Context assembly configuration
    #[serde(default)]
    pub context: ContextConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("completion", &self.completion)
            .field("memory", &self.memory)
            .field("context", &self.context)
            .field("gateway", &self.gateway)
            .finish()
    }
}

/// Completion API settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// API key (overridable via `OPENAI_API_KEY`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_completion_url")]
    pub base_url: String,

    /// Default model when the request does not name one
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Hard timeout for the completion call, in seconds
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
}

fn default_completion_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_completion_timeout() -> u64 {
    30
}

impl std::fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_completion_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_completion_timeout(),
        }
    }
}

/// Memory service settings.
///
/// With no API key the service is disabled: searches return nothing and
/// writes are dropped, without errors.
#[derive(Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// API key (overridable via `MEM0_API_KEY`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the memory service
    #[serde(default = "default_memory_url")]
    pub base_url: String,

    /// Maximum snippets retrieved per search
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Minimum relevance score for retrieved snippets
    #[serde(default = "default_search_threshold")]
    pub search_threshold: f32,

    /// Timeout for the search call, in seconds; expiry degrades to an
    /// empty result
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,
}

fn default_memory_url() -> String {
    "https://api.mem0.ai".into()
}
fn default_search_limit() -> usize {
    5
}
fn default_search_threshold() -> f32 {
    0.1
}
fn default_search_timeout() -> u64 {
    3
}

impl std::fmt::Debug for MemoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("search_limit", &self.search_limit)
            .field("search_threshold", &self.search_threshold)
            .field("search_timeout_secs", &self.search_timeout_secs)
            .finish()
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_memory_url(),
            search_limit: default_search_limit(),
            search_threshold: default_search_threshold(),
            search_timeout_secs: default_search_timeout(),
        }
    }
}

/// Context assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Token budget for the conversation history sent upstream
    #[serde(default = "default_history_budget")]
    pub max_history_tokens: usize,

    /// Apply the token budget to the history before dispatch. When
    /// `false` the budget is computed for reporting only and the full
    /// history is forwarded.
    #[serde(default = "default_true")]
    pub trim_history: bool,
}

fn default_history_budget() -> usize {
    3500
}
fn default_true() -> bool {
    true
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_history_tokens: default_history_budget(),
            trim_history: true,
        }
    }
}

/// Gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Substitute user id when the request carries none
    #[serde(default = "default_user_id")]
    pub default_user_id: String,
}

fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_user_id() -> String {
    "anonymous".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            default_user_id: default_user_id(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            completion: CompletionConfig::default(),
            memory: MemoryConfig::default(),
            context: ContextConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.memgate/config.toml).
    ///
    /// Environment variables take priority over the file:
    /// - `OPENAI_API_KEY` — completion API key
    /// - `MEM0_API_KEY` — memory service key
    /// - `MEMGATE_MODEL` — default model
    /// - `MEMGATE_PORT` — gateway port
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.completion.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("MEM0_API_KEY") {
            config.memory.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("MEMGATE_MODEL") {
            config.completion.model = model;
        }
        if let Ok(port) = std::env::var("MEMGATE_PORT") {
            config.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("MEMGATE_PORT is not a port number: {port}"))
            })?;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".memgate")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.completion.temperature < 0.0 || self.completion.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "completion.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.context.max_history_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "context.max_history_tokens must be > 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.memory.search_threshold) {
            return Err(ConfigError::ValidationError(
                "memory.search_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        Ok(())
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
