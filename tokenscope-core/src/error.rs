//! Error types for the Tokenscope research core.
//!
//! Uses `thiserror` for public API error types. Provider-level errors
//! (`LlmError`, `SearchError`) are absorbed or wrapped by the pipeline; a
//! failed run always surfaces as exactly one `ResearchError`.

use crate::research::extraction::ExtractedSummary;
use crate::research::stage_log::StageRecord;
use crate::retry::RateLimitSignal;
use std::fmt;

/// Errors from LLM provider interactions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider: {message}")]
    RateLimited { message: String },

    #[error("Model not available: {model}")]
    UnsupportedModel { model: String },

    #[error("Model {model} returned empty content")]
    EmptyContent { model: String },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Gave up after {attempts} rate-limited attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<LlmError> },
}

impl LlmError {
    /// Whether the error is tied to the requested model, so a call may be
    /// repeated once against the configured fallback model.
    pub fn is_model_related(&self) -> bool {
        match self {
            LlmError::UnsupportedModel { .. } => true,
            LlmError::ApiRequest { message } => {
                let lower = message.to_lowercase();
                lower.contains("model_not_found")
                    || lower.contains("does not exist")
                    || lower.contains("unsupported model")
            }
            _ => false,
        }
    }

    /// Whether the error points at setup (credentials, model names) rather
    /// than a transient provider problem.
    pub fn is_configuration(&self) -> bool {
        match self {
            LlmError::AuthFailed { .. } | LlmError::UnsupportedModel { .. } => true,
            LlmError::RetriesExhausted { last, .. } => last.is_configuration(),
            _ => false,
        }
    }
}

impl RateLimitSignal for LlmError {
    fn is_rate_limited(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::ApiRequest { message } | LlmError::Connection { message } => {
                crate::retry::mentions_rate_limit(message)
            }
            _ => false,
        }
    }
}

/// Errors from the web search provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    #[error("Search request failed: {message}")]
    Request { message: String },

    #[error("Search provider rate limited (HTTP {status})")]
    RateLimited { status: u16 },

    #[error("Search provider rejected credentials")]
    AuthFailed,

    #[error("Search gave up after {attempts} rate-limited attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<SearchError> },
}

impl SearchError {
    /// Whether the backend rejected our setup, so further queries are pointless.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SearchError::AuthFailed)
    }
}

impl RateLimitSignal for SearchError {
    fn is_rate_limited(&self) -> bool {
        match self {
            SearchError::RateLimited { .. } => true,
            SearchError::Request { message } => crate::retry::mentions_rate_limit(message),
            _ => false,
        }
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration load error: {0}")]
    Load(#[from] Box<figment::Error>),
}

/// Named phase of a research run, used to label terminal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Gathering,
    Ranking,
    Compression,
    Extraction,
    Synthesis,
    Speculation,
    Assembly,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Gathering => "gathering",
            Phase::Ranking => "ranking",
            Phase::Compression => "compression",
            Phase::Extraction => "extraction",
            Phase::Synthesis => "synthesis",
            Phase::Speculation => "speculation",
            Phase::Assembly => "assembly",
        };
        f.write_str(name)
    }
}

/// Diagnostic state attached to a failed run.
#[derive(Debug, Clone, Default)]
pub struct FailureContext {
    /// Stage log up to the point of failure.
    pub stages: Vec<StageRecord>,
    /// Extraction output that was already produced.
    pub extracted: Vec<ExtractedSummary>,
}

/// The single terminal error of a research run.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("Invalid research request: {message}")]
    InvalidRequest { message: String },

    #[error("Estimated cost ${estimated:.4} exceeds the remaining research budget")]
    BudgetExceeded { estimated: f64 },

    #[error("No sources found for '{project}' after all search stages and the emergency fallback")]
    NoSources {
        project: String,
        context: Box<FailureContext>,
    },

    #[error("Search failed during gathering: {source}")]
    Search {
        #[source]
        source: SearchError,
        context: Box<FailureContext>,
    },

    #[error("{phase} stage failed: {source}")]
    Stage {
        phase: Phase,
        #[source]
        source: LlmError,
        context: Box<FailureContext>,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ResearchError {
    /// Diagnostic context, when the failure happened after work started.
    pub fn context(&self) -> Option<&FailureContext> {
        match self {
            ResearchError::NoSources { context, .. }
            | ResearchError::Search { context, .. }
            | ResearchError::Stage { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Whether the failure stems from configuration rather than a transient
    /// provider problem.
    pub fn is_configuration(&self) -> bool {
        match self {
            ResearchError::Config(_) | ResearchError::InvalidRequest { .. } => true,
            ResearchError::Search { source, .. } => source.is_configuration(),
            ResearchError::Stage { source, .. } => source.is_configuration(),
            _ => false,
        }
    }
}
