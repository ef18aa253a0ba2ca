//! Batch summarization of standard and compressed tier sources.
//!
//! One LLM call per batch; the answer is split on `SOURCE n` markers. A
//! failed batch, or a source the answer skipped, falls back to truncating
//! the source's content, so this step never stops the run.

use super::prompts::compression_prompt;
use super::request::ResearchRequest;
use super::sources::{SourceDocument, truncate_chars};
use crate::brain::{LlmGateway, UsageMeter};
use crate::config::CompressionConfig;
use crate::types::StageKind;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

static SOURCE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^[\s#*>\-]*\**SOURCE\s+(\d+)\**\s*[:.)\-]?\**[ \t]*").unwrap()
});

/// Summary style for a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    /// Detailed, multi-aspect summaries.
    Standard,
    /// Brief, fact-dense summaries.
    Compressed,
}

impl CompressionMode {
    fn batch_size(&self, config: &CompressionConfig) -> usize {
        match self {
            CompressionMode::Standard => config.standard_batch_size,
            CompressionMode::Compressed => config.compressed_batch_size,
        }
        .max(1)
    }

    fn target_chars(&self, config: &CompressionConfig) -> usize {
        match self {
            CompressionMode::Standard => config.standard_target_chars,
            CompressionMode::Compressed => config.compressed_target_chars,
        }
    }
}

/// Counters reported in the stage log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressionStats {
    pub batches: usize,
    pub failed_batches: usize,
    /// Sources the answer skipped, kept as truncated content.
    pub unsummarized: usize,
}

/// Split a batch answer into exactly `expected` slots.
///
/// Numbered markers place text by number; text under an out-of-range or
/// repeated number goes to the next free slot. Slots the answer did not
/// cover stay `None` and are counted; extras are dropped.
pub fn split_batch_response(answer: &str, expected: usize) -> (Vec<Option<String>>, usize) {
    let markers: Vec<(usize, usize, Option<usize>)> = SOURCE_MARKER
        .captures_iter(answer)
        .filter_map(|c| {
            let whole = c.get(0)?;
            let n = c.get(1).and_then(|m| m.as_str().parse::<usize>().ok());
            Some((whole.start(), whole.end(), n))
        })
        .collect();

    let mut slots: Vec<Option<String>> = vec![None; expected];
    let mut overflow = Vec::new();
    for (i, &(_, body_start, number)) in markers.iter().enumerate() {
        let body_end = markers.get(i + 1).map_or(answer.len(), |m| m.0);
        let text = answer[body_start..body_end].trim().to_string();
        if text.is_empty() {
            continue;
        }
        match number {
            Some(n) if n >= 1 && n <= expected && slots[n - 1].is_none() => slots[n - 1] = Some(text),
            _ => overflow.push(text),
        }
    }

    let mut overflow = overflow.into_iter();
    let summaries: Vec<Option<String>> = slots
        .into_iter()
        .map(|slot| slot.or_else(|| overflow.next()))
        .collect();
    let missing = summaries.iter().filter(|s| s.is_none()).count();
    (summaries, missing)
}

/// Truncated cleaned (or raw) content, used when no summary is available.
fn truncated_content(doc: &SourceDocument, target: usize) -> String {
    let text = doc.cleaned_content.as_deref().unwrap_or(&doc.content);
    truncate_chars(text, target).to_string()
}

/// Summarize `sources` in batches, setting `extracted_content` on each.
pub async fn compress_sources(
    gateway: &LlmGateway,
    meter: &UsageMeter,
    request: &ResearchRequest,
    sources: &mut [SourceDocument],
    mode: CompressionMode,
    config: &CompressionConfig,
) -> CompressionStats {
    let mut stats = CompressionStats::default();
    let target = mode.target_chars(config);
    let delay = Duration::from_millis(config.batch_delay_ms);
    let stage = match mode {
        CompressionMode::Standard => "standard",
        CompressionMode::Compressed => "compressed",
    };

    for (i, batch) in sources.chunks_mut(mode.batch_size(config)).enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        stats.batches += 1;

        let prompt = compression_prompt(request, batch, mode == CompressionMode::Standard, target);
        match gateway
            .call(StageKind::Summarize, &prompt, prompt.len(), meter)
            .await
        {
            Ok(answer) => {
                let (summaries, missing) = split_batch_response(&answer, batch.len());
                stats.unsummarized += missing;
                for (doc, summary) in batch.iter_mut().zip(summaries) {
                    let summary = summary.unwrap_or_else(|| truncated_content(doc, target));
                    doc.extracted_content = Some(summary);
                }
                debug!(mode = stage, batch = i + 1, sources = batch.len(), missing, "Summarized batch");
            }
            Err(e) => {
                warn!(mode = stage, batch = i + 1, error = %e, "Batch summarization failed, truncating sources");
                stats.failed_batches += 1;
                for doc in batch.iter_mut() {
                    doc.extracted_content = Some(truncated_content(doc, target));
                }
            }
        }
    }
    stats
}
