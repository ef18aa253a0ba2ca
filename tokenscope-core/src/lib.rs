//! # Tokenscope Core
//!
//! Core library for the Tokenscope research pipeline.
//! Provides the search and LLM provider interfaces, the staged research
//! pipeline, retry and budget policies, configuration, and shared types.

pub mod analytics;
pub mod brain;
pub mod budget;
pub mod config;
pub mod error;
pub mod providers;
pub mod research;
pub mod retry;
pub mod search;
pub mod types;

// Re-export commonly used types at the crate root.
pub use analytics::{AnalyticsRecord, AnalyticsSink, MemoryAnalytics, TracingAnalytics};
pub use brain::{LlmGateway, LlmProvider, MockLlmProvider, UsageMeter};
pub use budget::{CostGate, CostTracker};
pub use config::{TokenscopeConfig, load_config};
pub use error::{ConfigError, FailureContext, LlmError, Phase, ResearchError, SearchError};
pub use research::{ResearchPipeline, ResearchReport, ResearchRequest, SourceDocument};
pub use retry::RetryPolicy;
pub use search::{SearchOptions, SearchProvider, SearchResponse};
pub use types::{CompletionRequest, CompletionResponse, StageKind, TokenUsage};
