//! Backend for Ollama's native API.
//!
//! [`OllamaBackend`] translates normalized [`ModelRequest`]s into Ollama's
//! `/api/generate` and `/api/chat` endpoints. This is the default backend.

use super::{Backend, ModelRequest, ModelResponse};
use crate::error::{ExtractError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Backend for Ollama's native API.
///
/// # Endpoint selection
///
/// Uses `/api/chat` when a non-empty `system_prompt` is set, and
/// `/api/generate` otherwise (prompt-only mode).
#[derive(Debug, Clone)]
pub struct OllamaBackend;

impl OllamaBackend {
    /// Build the Ollama `options` object from the config.
    fn build_options(request: &ModelRequest) -> Value {
        json!({
            "temperature": request.config.temperature,
            "num_predict": request.config.max_tokens,
        })
    }

    /// Whether this request should use `/api/chat` (vs `/api/generate`).
    fn use_chat(request: &ModelRequest) -> bool {
        request
            .system_prompt
            .as_ref()
            .is_some_and(|s| !s.is_empty())
    }

    /// Build the JSON body for `/api/generate`.
    fn build_generate_body(request: &ModelRequest) -> Value {
        let mut body = json!({
            "model": request.config.model,
            "prompt": request.prompt,
            "stream": false,
            "options": Self::build_options(request),
        });
        if request.config.json_mode {
            body["format"] = json!("json");
        }
        body
    }

    /// Build the JSON body for `/api/chat`.
    fn build_chat_body(request: &ModelRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(ref sys) = request.system_prompt {
            if !sys.is_empty() {
                messages.push(json!({"role": "system", "content": sys}));
            }
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        let mut body = json!({
            "model": request.config.model,
            "messages": messages,
            "stream": false,
            "options": Self::build_options(request),
        });
        if request.config.json_mode {
            body["format"] = json!("json");
        }
        body
    }

    /// Send the request and parse the response body.
    async fn send_request(
        client: &Client,
        url: &str,
        api_key: Option<&str>,
        body: &Value,
    ) -> Result<(Value, u16)> {
        let mut builder = client.post(url).json(body);
        if let Some(key) = api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await.map_err(|e| {
            ExtractError::Other(format!("failed to connect to model at {}: {}", url, e))
        })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExtractError::ModelCall { status, body });
        }

        let value: Value = resp.json().await?;
        Ok((value, status))
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &ModelRequest,
    ) -> Result<ModelResponse> {
        let (url, body, text_path) = if Self::use_chat(request) {
            (
                format!("{}/api/chat", base_url),
                Self::build_chat_body(request),
                "chat",
            )
        } else {
            (
                format!("{}/api/generate", base_url),
                Self::build_generate_body(request),
                "generate",
            )
        };

        let (value, status) =
            Self::send_request(client, &url, request.config.api_key.as_deref(), &body).await?;

        let text = if text_path == "chat" {
            value
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        } else {
            value
                .get("response")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };

        Ok(ModelResponse {
            text,
            status,
            metadata: Some(value),
        })
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ModelConfig;

    fn request(system: Option<&str>, json_mode: bool) -> ModelRequest {
        ModelRequest {
            system_prompt: system.map(|s| s.to_string()),
            prompt: "hello".to_string(),
            config: ModelConfig::default().with_json_mode(json_mode),
        }
    }

    #[test]
    fn test_generate_body_shape() {
        let body = OllamaBackend::build_generate_body(&request(None, false));
        assert_eq!(body["prompt"], "hello");
        assert_eq!(body["stream"], false);
        assert!(body.get("format").is_none());
    }

    #[test]
    fn test_json_mode_sets_format() {
        let body = OllamaBackend::build_generate_body(&request(None, true));
        assert_eq!(body["format"], "json");
    }

    #[test]
    fn test_chat_selected_with_system_prompt() {
        assert!(OllamaBackend::use_chat(&request(Some("be terse"), false)));
        assert!(!OllamaBackend::use_chat(&request(Some(""), false)));
        assert!(!OllamaBackend::use_chat(&request(None, false)));
    }

    #[test]
    fn test_chat_body_messages() {
        let body = OllamaBackend::build_chat_body(&request(Some("be terse"), false));
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
    }
}
