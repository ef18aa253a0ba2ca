//! Project research pipeline.
//!
//! Turns a project identifier into a long-form report:
//! 1. **Gather**: staged web search with per-query retry and fallbacks
//! 2. **Rank**: dedup, quality scoring, optional AI re-ranking, tiering
//! 3. **Compress**: batch summaries for the lower tiers
//! 4. **Extract**: per-source fact extraction
//! 5. **Write**: synthesis, speculation, then assembly under review

pub mod compression;
pub mod engine;
pub mod extraction;
pub mod gather;
pub mod output;
pub mod prompts;
pub mod quality;
pub mod query;
pub mod request;
pub mod rerank;
pub mod sources;
pub mod stage_log;
pub mod stages;
pub mod validation;

pub use engine::ResearchPipeline;
pub use extraction::ExtractedSummary;
pub use output::{ReportMetadata, ResearchReport};
pub use request::ResearchRequest;
pub use sources::{SourceDocument, Tier};
pub use stage_log::{StageRecord, StageStatus};
