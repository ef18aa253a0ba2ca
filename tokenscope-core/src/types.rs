//! Core type definitions shared by the providers and the pipeline.

use crate::providers::models::TokenParameter;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The pipeline step an LLM call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Rerank,
    Summarize,
    Extraction,
    Synthesis,
    Speculation,
    Assembly,
    Validation,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Rerank => "rerank",
            StageKind::Summarize => "summarize",
            StageKind::Extraction => "extraction",
            StageKind::Synthesis => "synthesis",
            StageKind::Speculation => "speculation",
            StageKind::Assembly => "assembly",
            StageKind::Validation => "validation",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-prompt completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Stage that issued the request; not sent over the wire.
    pub stage: StageKind,
    pub model: String,
    pub prompt: String,
    pub max_tokens: usize,
    /// Which request field carries `max_tokens` for this model.
    pub token_parameter: TokenParameter,
    /// `None` when the model does not accept a temperature.
    pub temperature: Option<f32>,
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }

    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// A provider's answer. `content` is `None` when the payload had no text.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub usage: Option<TokenUsage>,
    pub model: String,
}

impl CompletionResponse {
    pub fn text(model: &str, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            usage: None,
            model: model.to_string(),
        }
    }
}
