//! Multi-stage source gathering.
//!
//! Runs an ordered list of search stages. A failing query or stage is
//! logged and absorbed; only a run that ends with no sources at all, after
//! the emergency fallback query, is a hard failure. A credential rejection
//! from the search backend stops gathering at once.

use super::query::expand_queries;
use super::request::ResearchRequest;
use super::sources::{SourceDocument, dedupe};
use super::stage_log::{StageLog, StageRecord, StageStatus};
use crate::config::{PipelineConfig, SearchConfig};
use crate::error::SearchError;
use crate::retry::{RetryPolicy, with_backoff};
use crate::search::{SearchDepth, SearchOptions, SearchProvider};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// One search stage: base terms, expansion multiplier and retry class.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchStage {
    pub name: String,
    pub terms: Vec<String>,
    /// Scales the configured variation count for this stage.
    pub multiplier: usize,
    /// Essential stages get a larger retry budget and a simplified
    /// fallback query when they come back empty.
    pub essential: bool,
    pub depth: SearchDepth,
    pub domain_filter: Option<Vec<String>>,
}

impl SearchStage {
    fn new(name: &str, terms: Vec<String>, multiplier: usize, essential: bool) -> Self {
        Self {
            name: name.to_string(),
            terms,
            multiplier,
            essential,
            depth: SearchDepth::Basic,
            domain_filter: None,
        }
    }

    fn advanced(mut self) -> Self {
        self.depth = SearchDepth::Advanced;
        self
    }
}

/// The default stage list for a request.
pub fn default_stages(request: &ResearchRequest) -> Vec<SearchStage> {
    let name = request.name();

    let mut base_terms = vec![
        name.to_string(),
        format!("{} crypto", name),
        format!("{} token", name),
    ];
    if let Some(domain) = request.website_domain() {
        base_terms.push(format!("{} {}", name, domain));
    }
    if let Some(handle) = request.handle() {
        base_terms.push(format!("{} {}", name, handle));
    }
    if let Some(contract) = request
        .contract_address
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        base_terms.push(contract.to_string());
    }

    let mut stages = vec![
        SearchStage::new("base", base_terms, 1, true),
        SearchStage::new(
            "deep",
            vec![
                format!("{} whitepaper", name),
                format!("{} team founders", name),
                format!("{} tokenomics", name),
            ],
            2,
            true,
        )
        .advanced(),
    ];

    if let Some(domain) = request.website_domain() {
        let mut official = SearchStage::new("official", vec![name.to_string()], 0, false);
        official.domain_filter = Some(vec![domain]);
        stages.push(official);
    }

    stages.push(SearchStage::new(
        "market",
        vec![
            format!("{} price market cap", name),
            format!("{} community", name),
            format!("{} exchange listing", name),
        ],
        1,
        false,
    ));
    stages.push(
        SearchStage::new(
            "risk",
            vec![
                format!("{} audit security", name),
                format!("{} risks", name),
                format!("{} github", name),
            ],
            1,
            false,
        )
        .advanced(),
    );
    stages
}

/// Result of the gathering phase.
#[derive(Debug, Clone, Default)]
pub struct GatherOutcome {
    /// Deduplicated sources across all stages.
    pub sources: Vec<SourceDocument>,
    /// Sources before deduplication.
    pub raw_count: usize,
    pub queries_run: usize,
    /// Hit rate reported by the search provider on its last response.
    pub cache_hit_rate: f64,
    pub emergency_fallback_used: bool,
}

/// Drives the search stages for one run.
pub struct SourceGatherer<'a> {
    search: &'a dyn SearchProvider,
    pipeline: &'a PipelineConfig,
    search_config: &'a SearchConfig,
}

struct QueryTally {
    sources: Vec<SourceDocument>,
    queries: usize,
    failed: usize,
    cache_hit_rate: Option<f64>,
}

impl<'a> SourceGatherer<'a> {
    pub fn new(
        search: &'a dyn SearchProvider,
        pipeline: &'a PipelineConfig,
        search_config: &'a SearchConfig,
    ) -> Self {
        Self {
            search,
            pipeline,
            search_config,
        }
    }

    fn policy(&self, essential: bool) -> RetryPolicy {
        let attempts = if essential {
            self.pipeline.essential_search_attempts
        } else {
            self.pipeline.optional_search_attempts
        };
        RetryPolicy::new(attempts, self.pipeline.search_retry_base_delay_ms)
    }

    fn options_for(&self, stage: &SearchStage) -> SearchOptions {
        SearchOptions {
            max_results: self.search_config.max_results,
            depth: stage.depth,
            domain_filter: stage.domain_filter.clone(),
        }
    }

    /// Run every stage, then the emergency fallback if nothing was found.
    /// Returns deduplicated sources; the caller treats an empty set as fatal.
    /// Fails only when the search backend rejects our credentials.
    pub async fn gather(
        &self,
        request: &ResearchRequest,
        stages: &[SearchStage],
        log: &mut StageLog,
    ) -> Result<GatherOutcome, SearchError> {
        let mut all = Vec::new();
        let mut outcome = GatherOutcome::default();

        for stage in stages {
            let tally = self.run_stage(stage, log).await?;
            outcome.queries_run += tally.queries;
            if let Some(rate) = tally.cache_hit_rate {
                outcome.cache_hit_rate = rate;
            }
            all.extend(tally.sources);
        }

        if all.is_empty() {
            let query = format!("{} cryptocurrency", request.name());
            warn!(query = %query, "No sources from any stage, trying emergency fallback");
            let started = Instant::now();
            let options = SearchOptions {
                max_results: self.search_config.max_results,
                ..SearchOptions::default()
            };
            let tally = match self
                .run_queries(&[query], &options, &self.policy(true))
                .await
            {
                Ok(tally) => tally,
                Err(e) => {
                    log.push(
                        StageRecord::new("emergency_fallback", StageStatus::Failed)
                            .metric("queries", 1)
                            .metric("error", e.to_string()),
                    );
                    return Err(e);
                }
            };
            outcome.queries_run += tally.queries;
            outcome.emergency_fallback_used = true;
            let status = if tally.sources.is_empty() {
                StageStatus::Failed
            } else {
                StageStatus::Success
            };
            log.push(
                StageRecord::new("emergency_fallback", status)
                    .metric("queries", tally.queries)
                    .metric("sources", tally.sources.len())
                    .metric("duration_ms", started.elapsed().as_millis() as u64)
                    .metric("success", !tally.sources.is_empty()),
            );
            all.extend(tally.sources);
        }

        outcome.raw_count = all.len();
        outcome.sources = dedupe(all);
        info!(
            raw = outcome.raw_count,
            unique = outcome.sources.len(),
            queries = outcome.queries_run,
            "Source gathering complete"
        );
        Ok(outcome)
    }

    async fn run_stage(
        &self,
        stage: &SearchStage,
        log: &mut StageLog,
    ) -> Result<QueryTally, SearchError> {
        let started = Instant::now();
        let variations = self.pipeline.query_variations * stage.multiplier;
        let queries = expand_queries(&stage.terms, variations);
        let options = self.options_for(stage);
        let policy = self.policy(stage.essential);

        let aborted = |log: &mut StageLog, e: SearchError| {
            log.push(
                StageRecord::new(format!("search:{}", stage.name), StageStatus::Failed)
                    .metric("duration_ms", started.elapsed().as_millis() as u64)
                    .metric("success", false)
                    .metric("essential", stage.essential)
                    .metric("error", e.to_string()),
            );
            e
        };

        let mut tally = self
            .run_queries(&queries, &options, &policy)
            .await
            .map_err(|e| aborted(log, e))?;

        let mut fallback_used = false;
        if stage.essential
            && tally.sources.is_empty()
            && let Some(first) = stage.terms.first()
        {
            warn!(stage = %stage.name, query = %first, "Essential stage empty, retrying with simplest term");
            fallback_used = true;
            let retry = self
                .run_queries(std::slice::from_ref(first), &options, &policy)
                .await
                .map_err(|e| aborted(log, e))?;
            tally.queries += retry.queries;
            tally.failed += retry.failed;
            tally.sources = retry.sources;
            tally.cache_hit_rate = retry.cache_hit_rate.or(tally.cache_hit_rate);
        }

        let success = !tally.sources.is_empty();
        let status = match (success, tally.failed) {
            (true, 0) => StageStatus::Success,
            (true, _) => StageStatus::Degraded,
            (false, _) => StageStatus::Failed,
        };
        info!(
            stage = %stage.name,
            queries = tally.queries,
            sources = tally.sources.len(),
            failed_queries = tally.failed,
            "Search stage finished"
        );
        log.push(
            StageRecord::new(format!("search:{}", stage.name), status)
                .metric("queries", tally.queries)
                .metric("sources", tally.sources.len())
                .metric("failed_queries", tally.failed)
                .metric("duration_ms", started.elapsed().as_millis() as u64)
                .metric("success", success)
                .metric("essential", stage.essential)
                .metric("fallback_used", fallback_used),
        );
        Ok(tally)
    }

    /// Run queries in order with the configured pause between them. Query
    /// errors are logged and counted; a configuration error aborts the batch.
    async fn run_queries(
        &self,
        queries: &[String],
        options: &SearchOptions,
        policy: &RetryPolicy,
    ) -> Result<QueryTally, SearchError> {
        let delay = Duration::from_millis(self.search_config.query_delay_ms);
        let mut tally = QueryTally {
            sources: Vec::new(),
            queries: 0,
            failed: 0,
            cache_hit_rate: None,
        };

        for (i, query) in queries.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            tally.queries += 1;
            let result = with_backoff(policy, || self.search.search(query, options))
                .await
                .map_err(|e| {
                    e.into_inner_with(|attempts, last| SearchError::RetriesExhausted {
                        attempts,
                        last: Box::new(last),
                    })
                });
            match result {
                Ok(response) => {
                    tally.cache_hit_rate = Some(response.cache_hit_rate);
                    tally.sources.extend(response.results);
                }
                Err(e) if e.is_configuration() => {
                    error!(query = %query, error = %e, "Search backend rejected credentials");
                    return Err(e);
                }
                Err(e) => {
                    warn!(query = %query, error = %e, "Search query failed");
                    tally.failed += 1;
                }
            }
        }
        Ok(tally)
    }
}
