//! LLM provider implementations.
//!
//! Provides the OpenAI-compatible implementation of the `LlmProvider` trait
//! and the model capability catalog the gateway consults.
//!
//! Use `create_provider()` to instantiate the provider from config.

pub mod models;
pub mod openai_compat;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use std::sync::Arc;

pub use models::{ModelCapabilities, ModelCatalog, ModelClass, TokenParameter};
pub use openai_compat::OpenAiCompatibleProvider;

/// Create the configured LLM provider.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = OpenAiCompatibleProvider::new(config)?;
    tracing::info!(base_url = %config.base_url, "Created OpenAI-compatible provider");
    Ok(Arc::new(provider))
}

/// Create the provider with an explicitly provided API key.
pub fn create_provider_with_key(
    config: &LlmConfig,
    api_key: String,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    Ok(Arc::new(OpenAiCompatibleProvider::new_with_key(config, api_key)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_with_key() {
        let provider = create_provider_with_key(&LlmConfig::default(), "sk-test".into()).unwrap();
        assert_eq!(provider.name(), "openai-compatible");
    }

    #[test]
    fn test_create_provider_without_key_fails() {
        let config = LlmConfig {
            api_key_env: "TOKENSCOPE_TEST_LLM_KEY_NEVER_SET".into(),
            ..LlmConfig::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(matches!(err, LlmError::AuthFailed { .. }));
    }
}
