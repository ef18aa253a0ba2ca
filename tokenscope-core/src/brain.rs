//! Brain module: LLM provider abstraction and the call gateway.
//!
//! Defines the `LlmProvider` trait for model-agnostic completions and the
//! `LlmGateway` every pipeline stage calls through. The gateway adds stage
//! model routing, dynamic token budgets, rate-limit backoff, the non-empty
//! content check, one-shot model fallback and usage accounting.

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::providers::models::{ModelCapabilities, ModelCatalog, ModelClass};
use crate::research::stages::{StageProfile, token_budget};
use crate::retry::{RetryPolicy, with_backoff};
use crate::types::{CompletionRequest, CompletionResponse, StageKind, TokenUsage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a completion and return the raw response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Provider name for logs.
    fn name(&self) -> &str;
}

/// Per-run token and cost accounting.
#[derive(Debug, Default)]
pub struct UsageMeter {
    inner: Mutex<UsageTotals>,
}

/// Snapshot of a [`UsageMeter`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageTotals {
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub calls: u32,
}

impl UsageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, usage: &TokenUsage, cost_usd: f64) {
        let mut totals = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        totals.usage.accumulate(usage);
        totals.cost_usd += cost_usd;
        totals.calls += 1;
    }

    pub fn totals(&self) -> UsageTotals {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Routes stage calls to models and wraps every call in the pipeline's
/// failure policy.
pub struct LlmGateway {
    provider: Arc<dyn LlmProvider>,
    reasoning_model: String,
    fast_model: String,
    fallback_model: Option<String>,
    capabilities: HashMap<String, ModelCapabilities>,
    retry: RetryPolicy,
}

impl LlmGateway {
    /// Build a gateway, resolving each configured model against the catalog once.
    pub fn new(provider: Arc<dyn LlmProvider>, config: &LlmConfig, retry: RetryPolicy) -> Self {
        let catalog = ModelCatalog::new(&config.capabilities);
        let mut capabilities = HashMap::new();
        for model in [Some(&config.reasoning_model), Some(&config.fast_model), config.fallback_model.as_ref()]
            .into_iter()
            .flatten()
        {
            capabilities.insert(model.clone(), catalog.lookup(model));
        }
        Self {
            provider,
            reasoning_model: config.reasoning_model.clone(),
            fast_model: config.fast_model.clone(),
            fallback_model: config.fallback_model.clone(),
            capabilities,
            retry,
        }
    }

    /// The primary model a stage runs on.
    pub fn model_for(&self, stage: StageKind) -> &str {
        match StageProfile::for_stage(stage).model_class {
            ModelClass::Reasoning => &self.reasoning_model,
            ModelClass::Fast => &self.fast_model,
        }
    }

    fn capabilities_of(&self, model: &str) -> ModelCapabilities {
        self.capabilities
            .get(model)
            .cloned()
            .unwrap_or_else(|| ModelCapabilities::unknown(model))
    }

    /// Run one stage call. `content_len` is the size of the material the
    /// prompt carries and drives the token budget.
    pub async fn call(
        &self,
        stage: StageKind,
        prompt: &str,
        content_len: usize,
        meter: &UsageMeter,
    ) -> Result<String, LlmError> {
        let primary = self.model_for(stage).to_string();
        match self.call_model(stage, &primary, prompt, content_len, meter).await {
            Ok(content) => Ok(content),
            Err(e) if e.is_model_related() => match self.fallback_model.as_deref() {
                Some(fallback) if fallback != primary => {
                    warn!(
                        stage = %stage,
                        primary = %primary,
                        fallback,
                        error = %e,
                        "Model error, retrying once on fallback model"
                    );
                    self.call_model(stage, fallback, prompt, content_len, meter)
                        .await
                }
                _ => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    async fn call_model(
        &self,
        stage: StageKind,
        model: &str,
        prompt: &str,
        content_len: usize,
        meter: &UsageMeter,
    ) -> Result<String, LlmError> {
        let caps = self.capabilities_of(model);
        let profile = StageProfile::for_stage(stage);
        let request = CompletionRequest {
            stage,
            model: model.to_string(),
            prompt: prompt.to_string(),
            max_tokens: token_budget(stage, content_len),
            token_parameter: caps.token_parameter,
            temperature: caps.supports_temperature.then_some(profile.temperature),
        };

        debug!(
            stage = %stage,
            model,
            max_tokens = request.max_tokens,
            prompt_chars = prompt.len(),
            "Sending completion request"
        );

        let caps = &caps;
        let result = with_backoff(&self.retry, || {
            let request = request.clone();
            async move {
                let response = self.provider.complete(request).await?;
                // Estimate usage from text length when the provider omits it.
                let usage = response.usage.unwrap_or(TokenUsage {
                    input_tokens: prompt.len() / 4,
                    output_tokens: response.content.as_deref().map_or(0, |c| c.len() / 4),
                });
                meter.record(&usage, caps.cost(usage.input_tokens, usage.output_tokens));
                match response.content {
                    Some(content) if !content.trim().is_empty() => Ok(content),
                    _ => Err(LlmError::EmptyContent {
                        model: model.to_string(),
                    }),
                }
            }
        })
        .await
        .map_err(|e| {
            e.into_inner_with(|attempts, last| LlmError::RetriesExhausted {
                attempts,
                last: Box::new(last),
            })
        })?;

        info!(stage = %stage, model, response_chars = result.len(), "Completion received");
        Ok(result)
    }
}

type Responder = dyn Fn(&CompletionRequest) -> Result<CompletionResponse, LlmError> + Send + Sync;

/// A mock LLM provider for testing and development.
///
/// Queued responses are returned first, in order; after that the responder
/// (if any) answers, and otherwise a fixed text is returned.
pub struct MockLlmProvider {
    queued: Mutex<Vec<Result<CompletionResponse, LlmError>>>,
    responder: Option<Box<Responder>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            queued: Mutex::new(Vec::new()),
            responder: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that answers every request with `f`.
    pub fn with_responder<F>(f: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<CompletionResponse, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(f)),
            ..Self::new()
        }
    }

    /// Create a provider that answers every request with the same text.
    pub fn with_response(text: &str) -> Self {
        let text = text.to_string();
        Self::with_responder(move |req| Ok(CompletionResponse::text(&req.model, text.clone())))
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        self.queued.lock().unwrap().push(Ok(response));
    }

    /// Queue an error to be returned by the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        self.queued.lock().unwrap().push(Err(error));
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Number of requests issued by a given stage.
    pub fn calls_for(&self, stage: StageKind) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.stage == stage)
            .count()
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        {
            let mut queued = self.queued.lock().unwrap();
            if !queued.is_empty() {
                return queued.remove(0);
            }
        }
        match &self.responder {
            Some(responder) => responder(&request),
            None => Ok(CompletionResponse::text(
                &request.model,
                "I'm a mock LLM. No queued responses available.",
            )),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::models::TokenParameter;

    fn gateway(provider: Arc<MockLlmProvider>, fallback: Option<&str>) -> LlmGateway {
        let config = LlmConfig {
            fallback_model: fallback.map(str::to_string),
            ..LlmConfig::default()
        };
        LlmGateway::new(provider, &config, RetryPolicy::new(3, 0))
    }

    #[tokio::test]
    async fn test_mock_provider_queued_then_default() {
        let provider = MockLlmProvider::new();
        provider.queue_response(CompletionResponse::text("m", "first"));
        let req = CompletionRequest {
            stage: StageKind::Extraction,
            model: "m".into(),
            prompt: "p".into(),
            max_tokens: 10,
            token_parameter: TokenParameter::MaxTokens,
            temperature: None,
        };
        let first = provider.complete(req.clone()).await.unwrap();
        assert_eq!(first.content.as_deref(), Some("first"));
        let second = provider.complete(req).await.unwrap();
        assert!(second.content.unwrap().contains("mock LLM"));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_stage_routing_and_request_shape() {
        let provider = Arc::new(MockLlmProvider::with_response("ok"));
        let gw = gateway(provider.clone(), None);
        let meter = UsageMeter::new();

        gw.call(StageKind::Synthesis, "facts", 0, &meter).await.unwrap();
        gw.call(StageKind::Extraction, "source", 0, &meter).await.unwrap();

        let requests = provider.requests();
        assert_eq!(requests[0].model, "o4-mini");
        assert_eq!(requests[0].token_parameter, TokenParameter::MaxCompletionTokens);
        assert_eq!(requests[0].temperature, None);
        assert_eq!(requests[0].max_tokens, 6_000);
        assert_eq!(requests[1].model, "gpt-4o-mini");
        assert_eq!(requests[1].temperature, Some(0.2));
        assert_eq!(meter.totals().calls, 2);
    }

    #[tokio::test]
    async fn test_empty_content_is_an_error() {
        let provider = Arc::new(MockLlmProvider::with_response("   "));
        let gw = gateway(provider.clone(), Some("gpt-4o"));
        let err = gw
            .call(StageKind::Synthesis, "facts", 0, &UsageMeter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyContent { .. }));
        // Empty content is neither retried nor a reason to switch models.
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_rate_limits_are_retried() {
        let provider = Arc::new(MockLlmProvider::with_response("ok"));
        provider.queue_error(LlmError::RateLimited {
            message: "429".into(),
        });
        let gw = gateway(provider.clone(), None);
        let out = gw
            .call(StageKind::Validation, "report", 0, &UsageMeter::new())
            .await
            .unwrap();
        assert_eq!(out, "ok");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_maps_to_terminal_error() {
        let provider = Arc::new(MockLlmProvider::with_responder(|_| {
            Err(LlmError::RateLimited {
                message: "slow down".into(),
            })
        }));
        let gw = gateway(provider.clone(), Some("gpt-4o"));
        let err = gw
            .call(StageKind::Assembly, "x", 0, &UsageMeter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_model_error_falls_back_exactly_once() {
        let provider = Arc::new(MockLlmProvider::with_responder(|req| {
            Err(LlmError::UnsupportedModel {
                model: req.model.clone(),
            })
        }));
        let gw = gateway(provider.clone(), Some("gpt-4o"));
        let err = gw
            .call(StageKind::Synthesis, "x", 0, &UsageMeter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::UnsupportedModel { ref model } if model == "gpt-4o"));
        let models: Vec<String> = provider.requests().into_iter().map(|r| r.model).collect();
        assert_eq!(models, vec!["o4-mini".to_string(), "gpt-4o".to_string()]);
    }

    #[tokio::test]
    async fn test_fallback_recovers() {
        let provider = Arc::new(MockLlmProvider::with_response("from fallback"));
        provider.queue_error(LlmError::UnsupportedModel {
            model: "o4-mini".into(),
        });
        let gw = gateway(provider.clone(), Some("gpt-4o"));
        let out = gw
            .call(StageKind::Speculation, "x", 0, &UsageMeter::new())
            .await
            .unwrap();
        assert_eq!(out, "from fallback");
    }

    #[test]
    fn test_usage_meter() {
        let meter = UsageMeter::new();
        meter.record(
            &TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
            0.25,
        );
        meter.record(&TokenUsage::default(), 0.25);
        let totals = meter.totals();
        assert_eq!(totals.calls, 2);
        assert_eq!(totals.usage.total(), 15);
        assert!((totals.cost_usd - 0.5).abs() < f64::EPSILON);
    }
}
