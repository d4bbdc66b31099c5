//! Backend trait and normalized request/response types.
//!
//! The [`Backend`] trait abstracts over generative-model providers,
//! translating between the normalized [`ModelRequest`]/[`ModelResponse`]
//! types and provider-specific HTTP APIs. The extractor calls a backend
//! exactly once per item and feeds the returned value into the response
//! normalizer; it does not retry, cache, or rate-limit the call.
//!
//! Built-in implementations: [`OllamaBackend`], [`MockBackend`].

pub mod mock;
pub mod ollama;

pub use mock::MockBackend;
pub use ollama::OllamaBackend;

use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

/// Configuration bag for model calls: credentials, model identity, and
/// sampling parameters.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Model identifier (e.g. `"llama3.2:3b"`).
    pub model: String,

    /// API key sent as `Authorization: Bearer {key}` when present.
    pub api_key: Option<String>,

    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f64,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Request JSON-format output from the provider.
    pub json_mode: bool,

    /// Attach prompt/response debug data to extraction results.
    pub debug: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2:3b".to_string(),
            api_key: None,
            temperature: 0.7,
            max_tokens: 2048,
            json_mode: false,
            debug: false,
        }
    }
}

impl ModelConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }
}

/// A normalized model request -- provider-agnostic.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// If `Some`, this is a chat-style call with a system prompt.
    /// If `None`, this is a generate-style call (prompt only).
    pub system_prompt: Option<String>,

    /// The user prompt text.
    pub prompt: String,

    /// Model configuration (model name, temperature, max_tokens, etc.).
    pub config: ModelConfig,
}

/// A normalized model response.
#[derive(Debug)]
pub struct ModelResponse {
    /// The generated text content.
    pub text: String,

    /// HTTP status code (for diagnostics).
    pub status: u16,

    /// Provider-specific metadata (token counts, timing, model info).
    pub metadata: Option<Value>,
}

/// Abstraction over generative-model providers.
///
/// Implementors translate between the normalized request/response pair and
/// the provider's HTTP API.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute a model call and return the generated text.
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &ModelRequest,
    ) -> Result<ModelResponse>;

    /// Human-readable name for diagnostics.
    fn name(&self) -> &'static str;
}
