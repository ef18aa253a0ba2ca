//! Web search abstraction.
//!
//! The pipeline talks to search through the `SearchProvider` trait. The
//! Tavily client and an LRU caching decorator live in submodules.

pub mod cache;
pub mod tavily;

use crate::error::SearchError;
use crate::research::sources::SourceDocument;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use cache::CachingSearchProvider;
pub use tavily::TavilySearchProvider;

/// Longest query sent to a provider, in chars.
pub const MAX_QUERY_CHARS: usize = 400;

/// Search depth requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchDepth {
    #[default]
    Basic,
    Advanced,
}

impl SearchDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchDepth::Basic => "basic",
            SearchDepth::Advanced => "advanced",
        }
    }
}

/// Per-query options.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchOptions {
    pub max_results: usize,
    pub depth: SearchDepth,
    /// Restrict results to these domains.
    pub domain_filter: Option<Vec<String>>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: 10,
            depth: SearchDepth::Basic,
            domain_filter: None,
        }
    }
}

/// Results of one search call.
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub results: Vec<SourceDocument>,
    /// Queries served by this provider so far.
    pub total_queries: u64,
    /// Fraction of queries answered from cache (0.0 for uncached providers).
    pub cache_hit_rate: f64,
}

impl SearchResponse {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Trait for web search providers.
///
/// Implementations report non-success HTTP statuses and malformed payloads
/// as an empty response. Only rate limiting and rejected credentials are
/// returned as errors.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchResponse, SearchError>;

    fn name(&self) -> &str;
}

/// Trim a query, drop characters outside the safe set and cap its length.
pub fn sanitize_query(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .filter(|c| {
            c.is_alphanumeric()
                || c.is_whitespace()
                || matches!(c, '-' | '_' | '.' | ',' | ':' | '"' | '\'' | '$' | '@' | '/' | '#' | '&' | '+' | '?')
        })
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_QUERY_CHARS).collect::<String>().trim().to_string()
}
