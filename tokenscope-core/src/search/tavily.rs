//! Tavily web search client.

use super::{SearchOptions, SearchProvider, SearchResponse, sanitize_query};
use crate::config::{SearchConfig, resolve_api_key};
use crate::error::SearchError;
use crate::research::sources::SourceDocument;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Search provider backed by the Tavily `/search` endpoint.
pub struct TavilySearchProvider {
    client: Client,
    base_url: String,
    api_key: String,
    queries: AtomicU64,
}

impl TavilySearchProvider {
    /// Create a client, reading the API key from the configured env var.
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let api_key = resolve_api_key(&config.api_key_env).map_err(|_| SearchError::AuthFailed)?;
        Self::new_with_key(config, api_key)
    }

    pub fn new_with_key(config: &SearchConfig, api_key: String) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent("Tokenscope/0.3")
            .build()
            .map_err(|e| SearchError::Request {
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            queries: AtomicU64::new(0),
        })
    }

    fn request_body(query: &str, options: &SearchOptions) -> Value {
        let mut body = json!({
            "query": query,
            "search_depth": options.depth.as_str(),
            "max_results": options.max_results,
        });
        if let Some(domains) = &options.domain_filter
            && !domains.is_empty()
        {
            body["include_domains"] = json!(domains);
        }
        body
    }

    /// Parse the `results` array. Entries missing a URL are skipped.
    fn parse_results(body: &Value) -> Option<Vec<SourceDocument>> {
        let results = body.get("results")?.as_array()?;
        Some(
            results
                .iter()
                .filter_map(|r| {
                    let url = r.get("url")?.as_str()?;
                    let title = r.get("title").and_then(|t| t.as_str()).unwrap_or("");
                    let content = r
                        .get("raw_content")
                        .and_then(|c| c.as_str())
                        .filter(|c| !c.is_empty())
                        .or_else(|| r.get("content").and_then(|c| c.as_str()))
                        .unwrap_or("");
                    Some(SourceDocument::new(title, url, content))
                })
                .collect(),
        )
    }

    /// Map a response status to an error, or to whether the body is worth
    /// parsing. Rate limits and credential rejections are errors; other
    /// failures yield an empty result set.
    fn check_status(status: StatusCode) -> Result<bool, SearchError> {
        match status.as_u16() {
            429 => Err(SearchError::RateLimited { status: 429 }),
            401 | 403 => Err(SearchError::AuthFailed),
            _ => Ok(status.is_success()),
        }
    }

    /// Documents from a response body; a malformed payload yields none.
    fn parse_payload(body: &str, query: &str) -> Vec<SourceDocument> {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => Self::parse_results(&value).unwrap_or_else(|| {
                warn!(query = %query, "Search payload had no results array");
                Vec::new()
            }),
            Err(e) => {
                warn!(query = %query, error = %e, "Malformed search payload");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl SearchProvider for TavilySearchProvider {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchResponse, SearchError> {
        let query = sanitize_query(query);
        if query.is_empty() {
            return Ok(SearchResponse::empty());
        }
        let total_queries = self.queries.fetch_add(1, Ordering::Relaxed) + 1;
        let url = format!("{}/search", self.base_url);

        debug!(query = %query, depth = options.depth.as_str(), "Sending search request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&Self::request_body(&query, options))
            .send()
            .await
            .map_err(|e| SearchError::Request {
                message: format!("Search request failed: {}", e),
            })?;

        let status = response.status();
        let results = if Self::check_status(status)? {
            match response.text().await {
                Ok(body) => Self::parse_payload(&body, &query),
                Err(e) => {
                    warn!(query = %query, error = %e, "Failed to read search payload");
                    Vec::new()
                }
            }
        } else {
            warn!(query = %query, status = status.as_u16(), "Search returned non-success status");
            Vec::new()
        };

        Ok(SearchResponse {
            results,
            total_queries,
            cache_hit_rate: 0.0,
        })
    }

    fn name(&self) -> &str {
        "tavily"
    }
}
