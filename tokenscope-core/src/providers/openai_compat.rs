//! OpenAI-compatible LLM provider.
//!
//! Works against OpenAI and any endpoint that follows the chat completions
//! API format. Each request carries a single user message.

use crate::brain::LlmProvider;
use crate::config::{LlmConfig, resolve_api_key};
use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// A provider speaking the OpenAI chat completions protocol.
pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatibleProvider {
    /// Create a provider, reading the API key from the configured env var.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = resolve_api_key(&config.api_key_env).map_err(|_| LlmError::AuthFailed {
            provider: format!(
                "OpenAI-compatible: env var '{}' not set",
                config.api_key_env
            ),
        })?;
        Self::new_with_key(config, api_key)
    }

    /// Create a provider with an explicitly provided API key.
    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Build the JSON request body.
    fn request_body(request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": [{ "role": "user", "content": request.prompt }],
        });
        body[request.token_parameter.field_name()] = json!(request.max_tokens);
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }

    /// Parse a chat completions response body.
    fn parse_response(json: &Value, model: &str) -> Result<CompletionResponse, LlmError> {
        let choice = json
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| LlmError::ResponseParse {
                message: "No choices in response".to_string(),
            })?;

        let content = choice
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string);

        let usage = json.get("usage").map(|u| TokenUsage {
            input_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as usize,
            output_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as usize,
        });

        let model = json
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(model)
            .to_string();

        Ok(CompletionResponse {
            content,
            usage,
            model,
        })
    }

    /// Map an HTTP error status to an `LlmError`.
    fn map_http_error(status: reqwest::StatusCode, body: &str, model: &str) -> LlmError {
        let code = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("error")?.get("code")?.as_str().map(str::to_string))
            .unwrap_or_default();

        match status.as_u16() {
            401 | 403 => {
                debug!(body = %body, "Authentication failed ({})", status);
                LlmError::AuthFailed {
                    provider: "OpenAI-compatible".to_string(),
                }
            }
            429 => LlmError::RateLimited {
                message: format!("HTTP 429: {}", body),
            },
            404 => LlmError::UnsupportedModel {
                model: model.to_string(),
            },
            _ if code == "model_not_found" => LlmError::UnsupportedModel {
                model: model.to_string(),
            },
            s if s >= 500 => LlmError::ApiRequest {
                message: format!("Server error ({}): {}", status, body),
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {}: {}", status, body),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request);

        debug!(url = %url, model = %request.model, stage = %request.stage, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Connection {
                message: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        let response_body = response.text().await.map_err(|e| LlmError::ApiRequest {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &response_body, &request.model));
        }

        let json: Value =
            serde_json::from_str(&response_body).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON: {}", e),
            })?;

        Self::parse_response(&json, &request.model)
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}
