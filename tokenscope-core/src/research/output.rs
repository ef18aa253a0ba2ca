//! The research report returned to callers.

use super::sources::SourceDocument;
use super::stage_log::StageRecord;
use crate::types::TokenUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use uuid::Uuid;

/// Weight of the stage success ratio in the confidence score.
const STAGE_WEIGHT: f64 = 0.6;
/// Weight of average source quality in the confidence score.
const QUALITY_WEIGHT: f64 = 0.4;
/// Multiplier applied when the report never passed review.
const UNVALIDATED_PENALTY: f64 = 0.8;

/// Source counts per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub premium: usize,
    pub standard: usize,
    pub compressed: usize,
}

/// Timing, counts and scores for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Sources returned by search before deduplication.
    pub sources_gathered: usize,
    pub sources_unique: usize,
    pub sources_extracted: usize,
    pub tiers: TierCounts,
    pub average_quality: f64,
    pub reranked: bool,
    pub search_queries: usize,
    pub search_cache_hit_rate: f64,
    pub validation_passed: bool,
    pub validation_attempts: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub validation_issues: String,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub llm_calls: u32,
    /// 0-100 heuristic; see [`confidence_score`].
    pub confidence_score: f64,
    pub stages: Vec<StageRecord>,
}

/// Final artifact of a research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    pub run_id: Uuid,
    pub project_name: String,
    /// The assembled report (Markdown).
    pub report: String,
    pub synthesis: String,
    pub speculation: String,
    /// Leading sources in rank order, capped.
    pub sources: Vec<SourceDocument>,
    pub metadata: ReportMetadata,
}

impl ResearchReport {
    /// Report text followed by a numbered source list.
    pub fn to_markdown(&self) -> String {
        let mut out = self.report.trim_end().to_string();
        if !self.sources.is_empty() {
            out.push_str("\n\n---\n\n## Retrieved Sources\n\n");
            for (i, source) in self.sources.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "{}. [{}]({}) (quality {})",
                    i + 1,
                    if source.title.is_empty() { &source.url } else { &source.title },
                    source.url,
                    source.quality_score
                );
            }
        }
        let m = &self.metadata;
        let _ = write!(
            out,
            "\n_Validation: {} after {} attempt(s) | Confidence: {:.0} | Cost: ${:.4} | {:.1}s_\n",
            if m.validation_passed { "passed" } else { "not passed" },
            m.validation_attempts,
            m.confidence_score,
            m.cost_usd,
            m.duration_ms as f64 / 1000.0
        );
        out
    }
}

/// Placeholder confidence policy: weighted stage success ratio and
/// average source quality, discounted when validation did not pass.
/// The weights are uncalibrated.
pub fn confidence_score(
    stages_succeeded: usize,
    stages_attempted: usize,
    average_quality: f64,
    validation_passed: bool,
) -> f64 {
    let ratio = if stages_attempted == 0 {
        0.0
    } else {
        stages_succeeded as f64 / stages_attempted as f64
    };
    let mut score = STAGE_WEIGHT * ratio * 100.0 + QUALITY_WEIGHT * average_quality;
    if !validation_passed {
        score *= UNVALIDATED_PENALTY;
    }
    (score.clamp(0.0, 100.0) * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_score() {
        assert_eq!(confidence_score(5, 5, 100.0, true), 100.0);
        assert_eq!(confidence_score(5, 10, 50.0, true), 50.0);
        assert_eq!(confidence_score(5, 10, 50.0, false), 40.0);
        assert_eq!(confidence_score(0, 0, 0.0, true), 0.0);
    }

    fn metadata() -> ReportMetadata {
        ReportMetadata {
            started_at: Utc::now(),
            completed_at: Utc::now(),
            duration_ms: 1500,
            sources_gathered: 4,
            sources_unique: 3,
            sources_extracted: 3,
            tiers: TierCounts {
                premium: 3,
                standard: 0,
                compressed: 0,
            },
            average_quality: 40.0,
            reranked: false,
            search_queries: 12,
            search_cache_hit_rate: 0.0,
            validation_passed: true,
            validation_attempts: 1,
            validation_issues: String::new(),
            usage: TokenUsage::default(),
            cost_usd: 0.0123,
            llm_calls: 7,
            confidence_score: 76.0,
            stages: Vec::new(),
        }
    }

    #[test]
    fn test_markdown_lists_sources() {
        let report = ResearchReport {
            run_id: Uuid::new_v4(),
            project_name: "Acme".into(),
            report: "# Acme\n\nBody".into(),
            synthesis: String::new(),
            speculation: String::new(),
            sources: vec![SourceDocument::new("Acme docs", "https://acme.io", "c")],
            metadata: metadata(),
        };
        let md = report.to_markdown();
        assert!(md.starts_with("# Acme"));
        assert!(md.contains("1. [Acme docs](https://acme.io)"));
        assert!(md.contains("Validation: passed after 1 attempt(s)"));
    }

    #[test]
    fn test_report_serializes() {
        let report = ResearchReport {
            run_id: Uuid::new_v4(),
            project_name: "Acme".into(),
            report: "r".into(),
            synthesis: "s".into(),
            speculation: "p".into(),
            sources: Vec::new(),
            metadata: metadata(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["metadata"]["validation_passed"], true);
        assert!(json["metadata"].get("validation_issues").is_none());
    }
}
