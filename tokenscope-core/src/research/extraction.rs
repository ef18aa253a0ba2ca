//! Per-source fact extraction with bounded concurrency.
//!
//! Sources are processed in fixed-size batches: every call in a batch is
//! started together and jointly awaited before the next batch begins.

use super::prompts::extraction_prompt;
use super::request::ResearchRequest;
use super::sources::{SourceDocument, Tier};
use crate::brain::{LlmGateway, UsageMeter};
use crate::error::LlmError;
use crate::types::StageKind;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Facts extracted from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSummary {
    pub url: String,
    pub title: String,
    pub tier: Tier,
    pub summary: String,
}

/// Result of the extraction stage.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    pub summaries: Vec<ExtractedSummary>,
    pub failed: usize,
    /// Last per-source error, kept for the terminal error when nothing succeeded.
    pub last_error: Option<LlmError>,
}

/// Extract facts from every source. Individual failures drop that source.
pub async fn extract_all(
    gateway: &LlmGateway,
    meter: &UsageMeter,
    request: &ResearchRequest,
    sources: &[SourceDocument],
    concurrency: usize,
) -> ExtractionOutcome {
    let mut outcome = ExtractionOutcome::default();

    for (batch_idx, batch) in sources.chunks(concurrency.max(1)).enumerate() {
        let calls = batch.iter().map(|doc| async move {
            let prompt = extraction_prompt(request, doc);
            let result = gateway
                .call(StageKind::Extraction, &prompt, doc.best_text().len(), meter)
                .await;
            (doc, result)
        });

        for (doc, result) in join_all(calls).await {
            match result {
                Ok(summary) => outcome.summaries.push(ExtractedSummary {
                    url: doc.url.clone(),
                    title: doc.title.clone(),
                    tier: doc.tier.unwrap_or(Tier::Compressed),
                    summary,
                }),
                Err(e) => {
                    warn!(url = %doc.url, batch = batch_idx + 1, error = %e, "Extraction failed, dropping source");
                    outcome.failed += 1;
                    outcome.last_error = Some(e);
                }
            }
        }
    }

    info!(
        extracted = outcome.summaries.len(),
        failed = outcome.failed,
        "Extraction stage finished"
    );
    outcome
}
