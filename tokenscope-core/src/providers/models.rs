//! Model capability catalog.
//!
//! Maps a model identifier to its calling convention and class. The table is
//! consulted once per model when the LLM gateway is built; nothing in the
//! pipeline infers behaviour from model-name prefixes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Broad class of a model, used for stage routing and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelClass {
    /// Slower, deliberate models used for synthesis-style stages.
    Reasoning,
    /// Cheap, low-latency models used for extraction and review.
    Fast,
}

/// Name of the request field that carries the output-token limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenParameter {
    MaxTokens,
    MaxCompletionTokens,
}

impl TokenParameter {
    pub fn field_name(&self) -> &'static str {
        match self {
            TokenParameter::MaxTokens => "max_tokens",
            TokenParameter::MaxCompletionTokens => "max_completion_tokens",
        }
    }
}

/// One row of the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    /// The model identifier (e.g., "gpt-4o-mini").
    pub id: String,
    pub class: ModelClass,
    pub token_parameter: TokenParameter,
    /// Whether the API accepts a `temperature` field for this model.
    pub supports_temperature: bool,
    /// Context window size in tokens.
    pub context_window: usize,
    /// Input cost per million tokens (USD).
    pub input_cost_per_million: f64,
    /// Output cost per million tokens (USD).
    pub output_cost_per_million: f64,
}

impl ModelCapabilities {
    /// Conservative defaults for a model the catalog does not know.
    pub fn unknown(id: &str) -> Self {
        Self {
            id: id.to_string(),
            class: ModelClass::Fast,
            token_parameter: TokenParameter::MaxTokens,
            supports_temperature: true,
            context_window: 128_000,
            input_cost_per_million: 2.50,
            output_cost_per_million: 10.0,
        }
    }

    /// USD cost of a call with the given token counts.
    pub fn cost(&self, input_tokens: usize, output_tokens: usize) -> f64 {
        input_tokens as f64 * self.input_cost_per_million / 1_000_000.0
            + output_tokens as f64 * self.output_cost_per_million / 1_000_000.0
    }
}

fn row(
    id: &str,
    class: ModelClass,
    token_parameter: TokenParameter,
    supports_temperature: bool,
    context_window: usize,
    pricing: (f64, f64),
) -> ModelCapabilities {
    ModelCapabilities {
        id: id.to_string(),
        class,
        token_parameter,
        supports_temperature,
        context_window,
        input_cost_per_million: pricing.0,
        output_cost_per_million: pricing.1,
    }
}

/// Built-in rows for common OpenAI-compatible models.
pub fn builtin_capabilities() -> Vec<ModelCapabilities> {
    use ModelClass::{Fast, Reasoning};
    use TokenParameter::{MaxCompletionTokens, MaxTokens};
    vec![
        row("gpt-4o", Fast, MaxTokens, true, 128_000, (2.50, 10.0)),
        row("gpt-4o-mini", Fast, MaxTokens, true, 128_000, (0.15, 0.60)),
        row("gpt-4.1", Fast, MaxTokens, true, 1_047_576, (2.00, 8.00)),
        row("gpt-4.1-mini", Fast, MaxTokens, true, 1_047_576, (0.40, 1.60)),
        row("gpt-4.1-nano", Fast, MaxTokens, true, 1_047_576, (0.10, 0.40)),
        row("o1", Reasoning, MaxCompletionTokens, false, 200_000, (15.0, 60.0)),
        row("o3", Reasoning, MaxCompletionTokens, false, 200_000, (2.00, 8.00)),
        row("o3-mini", Reasoning, MaxCompletionTokens, false, 200_000, (1.10, 4.40)),
        row("o4-mini", Reasoning, MaxCompletionTokens, false, 200_000, (1.10, 4.40)),
        row("gpt-5", Reasoning, MaxCompletionTokens, false, 400_000, (1.25, 10.0)),
        row("gpt-5-mini", Reasoning, MaxCompletionTokens, false, 400_000, (0.25, 2.00)),
    ]
}

/// Lookup table from model identifier to capabilities.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    entries: HashMap<String, ModelCapabilities>,
}

impl ModelCatalog {
    /// Built-in rows, with `extra` rows replacing any built-in of the same id.
    pub fn new(extra: &[ModelCapabilities]) -> Self {
        let mut entries: HashMap<String, ModelCapabilities> = builtin_capabilities()
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        for caps in extra {
            entries.insert(caps.id.clone(), caps.clone());
        }
        Self { entries }
    }

    /// Capabilities for `model`, falling back to [`ModelCapabilities::unknown`].
    pub fn lookup(&self, model: &str) -> ModelCapabilities {
        self.entries
            .get(model)
            .cloned()
            .unwrap_or_else(|| ModelCapabilities::unknown(model))
    }

    pub fn contains(&self, model: &str) -> bool {
        self.entries.contains_key(model)
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasoning_models_use_completion_tokens() {
        let catalog = ModelCatalog::default();
        let caps = catalog.lookup("o4-mini");
        assert_eq!(caps.class, ModelClass::Reasoning);
        assert_eq!(caps.token_parameter.field_name(), "max_completion_tokens");
        assert!(!caps.supports_temperature);
    }

    #[test]
    fn test_unknown_model_defaults() {
        let catalog = ModelCatalog::default();
        assert!(!catalog.contains("my-local-llama"));
        let caps = catalog.lookup("my-local-llama");
        assert_eq!(caps.class, ModelClass::Fast);
        assert_eq!(caps.token_parameter, TokenParameter::MaxTokens);
    }

    #[test]
    fn test_extra_rows_override_builtins() {
        let mut custom = ModelCapabilities::unknown("gpt-4o-mini");
        custom.input_cost_per_million = 0.0;
        custom.output_cost_per_million = 0.0;
        let catalog = ModelCatalog::new(&[custom]);
        assert_eq!(catalog.lookup("gpt-4o-mini").cost(1_000, 1_000), 0.0);
    }

    #[test]
    fn test_cost() {
        let caps = ModelCatalog::default().lookup("gpt-4o");
        let cost = caps.cost(1_000_000, 100_000);
        assert!((cost - 3.5).abs() < 1e-9);
    }
}
