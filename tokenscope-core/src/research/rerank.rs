//! Best-effort AI re-ranking of scored sources.
//!
//! The model sees a numbered preview and answers with an index list. The
//! answer is parsed as a JSON array first, then by scanning for integers;
//! if neither yields anything the original order is kept.

use super::prompts::rerank_prompt;
use super::request::ResearchRequest;
use super::sources::SourceDocument;
use crate::brain::{LlmGateway, UsageMeter};
use crate::config::PipelineConfig;
use crate::types::StageKind;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{info, warn};

static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());
static JSON_ARRAY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\[[^\[\]]*\]").unwrap());

/// Outcome of the re-ranking step.
#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub sources: Vec<SourceDocument>,
    /// Whether the model's ordering was applied.
    pub applied: bool,
}

/// Parse a model answer into 1-based indices.
///
/// Returns `None` when no integers can be found.
pub fn parse_index_list(answer: &str) -> Option<Vec<usize>> {
    for candidate in JSON_ARRAY.find_iter(answer) {
        if let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(candidate.as_str()) {
            let indices: Vec<usize> = values
                .iter()
                .filter_map(|v| match v {
                    serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize),
                    serde_json::Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                })
                .collect();
            if !indices.is_empty() {
                return Some(indices);
            }
        }
    }

    let scanned: Vec<usize> = INTEGER
        .find_iter(answer)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    (!scanned.is_empty()).then_some(scanned)
}

/// Reorder `sources` by 1-based `order`. Out-of-range and repeated indices
/// are ignored, unmentioned sources follow in original order, and the
/// result is capped at `cap`.
pub fn apply_order(sources: Vec<SourceDocument>, order: &[usize], cap: usize) -> Vec<SourceDocument> {
    let mut slots: Vec<Option<SourceDocument>> = sources.into_iter().map(Some).collect();
    let mut ranked = Vec::with_capacity(slots.len());

    for &index in order {
        if index == 0 || index > slots.len() {
            continue;
        }
        if let Some(doc) = slots[index - 1].take() {
            ranked.push(doc);
        }
    }
    ranked.extend(slots.into_iter().flatten());
    ranked.truncate(cap);
    ranked
}

/// Re-rank when the candidate count exceeds the configured threshold.
///
/// Never fails: call errors and unparseable answers keep the score order.
pub async fn rerank(
    gateway: &LlmGateway,
    meter: &UsageMeter,
    request: &ResearchRequest,
    sources: Vec<SourceDocument>,
    config: &PipelineConfig,
) -> RerankOutcome {
    if sources.len() <= config.rerank_threshold {
        return RerankOutcome {
            sources,
            applied: false,
        };
    }

    let preview_len = sources.len().min(config.rerank_preview_limit);
    let prompt = rerank_prompt(request, &sources[..preview_len]);

    let answer = match gateway
        .call(StageKind::Rerank, &prompt, prompt.len(), meter)
        .await
    {
        Ok(answer) => answer,
        Err(e) => {
            warn!(error = %e, "Re-ranking call failed, keeping score order");
            return RerankOutcome {
                sources,
                applied: false,
            };
        }
    };

    match parse_index_list(&answer) {
        Some(order) => {
            // Indices beyond the preview were never shown to the model.
            let order: Vec<usize> = order.into_iter().filter(|&i| i <= preview_len).collect();
            let ranked = apply_order(sources, &order, config.rerank_output_cap);
            info!(ranked = ranked.len(), mentioned = order.len(), "Applied AI re-ranking");
            RerankOutcome {
                sources: ranked,
                applied: true,
            }
        }
        None => {
            warn!("Re-ranking answer had no indices, keeping score order");
            RerankOutcome {
                sources,
                applied: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::config::LlmConfig;
    use crate::retry::RetryPolicy;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn docs(n: usize) -> Vec<SourceDocument> {
        (1..=n)
            .map(|i| SourceDocument::new(format!("t{i}"), format!("https://s.io/{i}"), "c"))
            .collect()
    }

    fn urls(docs: &[SourceDocument]) -> Vec<String> {
        docs.iter().map(|d| d.url.trim_start_matches("https://s.io/").to_string()).collect()
    }

    #[test]
    fn test_parse_json_array() {
        assert_eq!(parse_index_list("Here you go: [3, 1, \"2\"]"), Some(vec![3, 1, 2]));
    }

    #[test]
    fn test_parse_falls_back_to_integer_scan() {
        assert_eq!(parse_index_list("Best: 4, then 2 and 9."), Some(vec![4, 2, 9]));
        assert_eq!(parse_index_list("no numbers here"), None);
    }

    #[test]
    fn test_apply_order() {
        let ranked = apply_order(docs(5), &[3, 99, 0, 1, 3], 10);
        assert_eq!(urls(&ranked), vec!["3", "1", "2", "4", "5"]);
    }

    #[test]
    fn test_apply_order_caps() {
        let ranked = apply_order(docs(5), &[5, 4], 3);
        assert_eq!(urls(&ranked), vec!["5", "4", "1"]);
    }

    fn gateway(provider: Arc<MockLlmProvider>) -> LlmGateway {
        LlmGateway::new(provider, &LlmConfig::default(), RetryPolicy::new(1, 0))
    }

    #[tokio::test]
    async fn test_below_threshold_skips_call() {
        let provider = Arc::new(MockLlmProvider::with_response("[2, 1]"));
        let out = rerank(
            &gateway(provider.clone()),
            &UsageMeter::new(),
            &ResearchRequest::new("Acme"),
            docs(20),
            &PipelineConfig::default(),
        )
        .await;
        assert!(!out.applied);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_reorders_above_threshold() {
        let provider = Arc::new(MockLlmProvider::with_response("[21, 2]"));
        let out = rerank(
            &gateway(provider.clone()),
            &UsageMeter::new(),
            &ResearchRequest::new("Acme"),
            docs(21),
            &PipelineConfig::default(),
        )
        .await;
        assert!(out.applied);
        assert_eq!(out.sources.len(), 21);
        assert_eq!(urls(&out.sources[..3]), vec!["21", "2", "1"]);
    }

    #[tokio::test]
    async fn test_garbage_answer_keeps_order() {
        let provider = Arc::new(MockLlmProvider::with_response("I cannot rank these."));
        let input = docs(25);
        let out = rerank(
            &gateway(provider),
            &UsageMeter::new(),
            &ResearchRequest::new("Acme"),
            input.clone(),
            &PipelineConfig::default(),
        )
        .await;
        assert!(!out.applied);
        assert_eq!(out.sources, input);
    }
}
