//! Configuration system for Tokenscope.
//!
//! Uses `figment` for layered configuration: defaults -> config files -> environment -> overrides.
//! Configuration is loaded from `~/.config/tokenscope/config.toml` and/or
//! `.tokenscope/config.toml` in the workspace directory.

use crate::error::ConfigError;
use crate::providers::models::ModelCapabilities;
use crate::retry::RetryPolicy;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenscopeConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub pipeline: PipelineConfig,
    pub budget: BudgetConfig,
}

/// LLM endpoint and per-class model selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible chat completions API.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Model used for synthesis, speculation and assembly.
    pub reasoning_model: String,
    /// Model used for extraction, validation, re-ranking and summarization.
    pub fast_model: String,
    /// Secondary model tried once when the primary fails for a model-related reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_model: Option<String>,
    /// Request timeout for a single completion, in seconds.
    pub request_timeout_secs: u64,
    /// Extra rows merged over the built-in model catalog.
    #[serde(default)]
    pub capabilities: Vec<ModelCapabilities>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            reasoning_model: "o4-mini".to_string(),
            fast_model: "gpt-4o-mini".to_string(),
            fallback_model: Some("gpt-4o".to_string()),
            request_timeout_secs: 300,
            capabilities: Vec::new(),
        }
    }
}

/// Web search provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Base URL of the Tavily-compatible search API.
    pub base_url: String,
    /// Environment variable holding the search API key.
    pub api_key_env: String,
    /// Results requested per query.
    pub max_results: usize,
    /// Pause between consecutive queries of a stage, in milliseconds.
    pub query_delay_ms: u64,
    /// Entries kept by the in-process search cache (0 disables it).
    pub cache_capacity: usize,
    /// Request timeout, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.tavily.com".to_string(),
            api_key_env: "TAVILY_API_KEY".to_string(),
            max_results: 10,
            query_delay_ms: 300,
            cache_capacity: 256,
            request_timeout_secs: 30,
        }
    }
}

/// Knobs for the research pipeline itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Attempts per query in essential search stages.
    pub essential_search_attempts: u32,
    /// Attempts per query in non-essential search stages.
    pub optional_search_attempts: u32,
    /// Base delay for search retries, in milliseconds.
    pub search_retry_base_delay_ms: u64,
    /// Variations per base term; each search stage scales this by its multiplier.
    pub query_variations: usize,
    /// Re-ranking runs when more than this many sources survive scoring.
    pub rerank_threshold: usize,
    /// Sources shown to the re-ranking model.
    pub rerank_preview_limit: usize,
    /// Sources kept after re-ranking.
    pub rerank_output_cap: usize,
    /// Sources extracted concurrently per batch.
    pub extraction_concurrency: usize,
    /// Reports longer than this (in chars) are validated chunk by chunk.
    pub validation_chunk_threshold: usize,
    /// Upper bound on a validation chunk, in chars.
    pub validation_chunk_size: usize,
    /// Assembly attempts in the validation loop.
    pub max_validation_attempts: u32,
    /// Sources retained in the final report.
    pub max_report_sources: usize,
    /// Retry policy for LLM calls.
    pub llm_retry: RetryPolicy,
    pub tiers: TierConfig,
    pub compression: CompressionConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            essential_search_attempts: 3,
            optional_search_attempts: 2,
            search_retry_base_delay_ms: 1000,
            query_variations: 2,
            rerank_threshold: 20,
            rerank_preview_limit: 120,
            rerank_output_cap: 100,
            extraction_concurrency: 5,
            validation_chunk_threshold: 15_000,
            validation_chunk_size: 8_000,
            max_validation_attempts: 2,
            max_report_sources: 50,
            llm_retry: RetryPolicy::default(),
            tiers: TierConfig::default(),
            compression: CompressionConfig::default(),
        }
    }
}

/// Caps for the premium/standard/compressed partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    pub premium_cap: usize,
    pub standard_cap: usize,
    /// Total sources kept across all three tiers.
    pub total_cap: usize,
    /// Premium sources keep at most this many chars of content.
    pub premium_char_cap: usize,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            premium_cap: 15,
            standard_cap: 40,
            total_cap: 100,
            premium_char_cap: 8_000,
        }
    }
}

/// Batch summarization settings for the standard and compressed tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub standard_batch_size: usize,
    pub compressed_batch_size: usize,
    /// Target summary length for standard sources, in chars.
    pub standard_target_chars: usize,
    /// Target summary length for compressed sources, in chars.
    pub compressed_target_chars: usize,
    /// Pause between batches, in milliseconds.
    pub batch_delay_ms: u64,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            standard_batch_size: 5,
            compressed_batch_size: 10,
            standard_target_chars: 1_200,
            compressed_target_chars: 400,
            batch_delay_ms: 1_000,
        }
    }
}

/// Spend limit for the built-in cost tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Maximum USD spent per process (0 = unlimited).
    pub session_limit_usd: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            session_limit_usd: 5.0,
        }
    }
}

impl TokenscopeConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        if p.extraction_concurrency == 0 {
            return Err(ConfigError::Invalid {
                message: "pipeline.extraction_concurrency must be at least 1".into(),
            });
        }
        if p.compression.standard_batch_size == 0 || p.compression.compressed_batch_size == 0 {
            return Err(ConfigError::Invalid {
                message: "compression batch sizes must be at least 1".into(),
            });
        }
        if p.max_validation_attempts == 0 {
            return Err(ConfigError::Invalid {
                message: "pipeline.max_validation_attempts must be at least 1".into(),
            });
        }
        if p.validation_chunk_size == 0 {
            return Err(ConfigError::Invalid {
                message: "pipeline.validation_chunk_size must be at least 1".into(),
            });
        }
        if self.llm.reasoning_model.is_empty() || self.llm.fast_model.is_empty() {
            return Err(ConfigError::Invalid {
                message: "llm.reasoning_model and llm.fast_model must be set".into(),
            });
        }
        Ok(())
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `TOKENSCOPE_`)
/// 3. An explicit config file (`--config`)
/// 4. Workspace-local config (`.tokenscope/config.toml`)
/// 5. User config (`~/.config/tokenscope/config.toml`)
/// 6. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&TokenscopeConfig>,
) -> Result<TokenscopeConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(TokenscopeConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "tokenscope", "tokenscope") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".tokenscope").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = config_file {
        if !path.exists() {
            return Err(ConfigError::Invalid {
                message: format!("config file not found: {}", path.display()),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    // TOKENSCOPE_LLM__FAST_MODEL, TOKENSCOPE_PIPELINE__EXTRACTION_CONCURRENCY, ...
    figment = figment.merge(Env::prefixed("TOKENSCOPE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: TokenscopeConfig = figment.extract().map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}

/// Read an API key from the environment variable named in config.
pub fn resolve_api_key(env_var: &str) -> Result<String, ConfigError> {
    std::env::var(env_var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::EnvVarMissing {
            var: env_var.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TokenscopeConfig::default();
        assert_eq!(config.llm.fast_model, "gpt-4o-mini");
        assert_eq!(config.pipeline.rerank_threshold, 20);
        assert_eq!(config.pipeline.max_validation_attempts, 2);
        assert_eq!(config.pipeline.llm_retry, RetryPolicy::new(5, 1000));
        assert_eq!(config.pipeline.tiers.premium_cap, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = TokenscopeConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: TokenscopeConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.llm.reasoning_model, config.llm.reasoning_model);
        assert_eq!(parsed.search.max_results, config.search.max_results);
    }

    #[test]
    fn test_load_config_with_overrides() {
        let mut overrides = TokenscopeConfig::default();
        overrides.llm.fast_model = "gpt-4.1-mini".to_string();
        overrides.pipeline.extraction_concurrency = 3;

        let config = load_config(None, None, Some(&overrides)).unwrap();
        assert_eq!(config.llm.fast_model, "gpt-4.1-mini");
        assert_eq!(config.pipeline.extraction_concurrency, 3);
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let ws_dir = dir.path().join(".tokenscope");
        std::fs::create_dir_all(&ws_dir).unwrap();
        std::fs::write(
            ws_dir.join("config.toml"),
            r#"
[pipeline]
rerank_threshold = 35

[pipeline.tiers]
premium_cap = 8
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None, None).unwrap();
        assert_eq!(config.pipeline.rerank_threshold, 35);
        assert_eq!(config.pipeline.tiers.premium_cap, 8);
        assert_eq!(config.pipeline.tiers.standard_cap, 40);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = load_config(None, Some(Path::new("/nonexistent/tokenscope.toml")), None);
        assert!(matches!(err, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = TokenscopeConfig::default();
        config.pipeline.extraction_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_api_key_missing() {
        let err = resolve_api_key("TOKENSCOPE_TEST_KEY_THAT_IS_NEVER_SET").unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarMissing { .. }));
    }
}
