//! Research pipeline: orchestrates a full research run.
//!
//! Gathering → scoring → re-ranking → tiering → compression → extraction →
//! synthesis → speculation → assembly/validation. Collaborators are passed
//! in at construction; the pipeline holds no global state.

use super::compression::{CompressionMode, CompressionStats, compress_sources};
use super::extraction::{ExtractedSummary, extract_all};
use super::gather::{SourceGatherer, default_stages};
use super::output::{ReportMetadata, ResearchReport, TierCounts, confidence_score};
use super::prompts::{speculation_prompt, synthesis_prompt};
use super::quality::{score_sources, tier_sources};
use super::request::ResearchRequest;
use super::rerank::rerank;
use super::stage_log::{StageLog, StageRecord, StageStatus};
use super::stages::StageProfile;
use crate::analytics::{AnalyticsRecord, AnalyticsSink};
use crate::brain::{LlmGateway, LlmProvider, UsageMeter};
use crate::budget::CostGate;
use crate::config::TokenscopeConfig;
use crate::error::{FailureContext, LlmError, Phase, ResearchError};
use crate::providers::models::{ModelCatalog, ModelClass};
use crate::search::SearchProvider;
use crate::types::StageKind;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Rough chars-per-token ratio used for estimates.
const CHARS_PER_TOKEN: usize = 4;
/// Assumed average size of a source fed to extraction, in tokens.
const EST_SOURCE_TOKENS: usize = 3_000;
/// Assumed size of one extracted summary, in tokens.
const EST_SUMMARY_TOKENS: usize = 300;

/// Runs research requests against injected providers.
pub struct ResearchPipeline {
    config: TokenscopeConfig,
    catalog: ModelCatalog,
    gateway: LlmGateway,
    search: Arc<dyn SearchProvider>,
    cost_gate: Arc<dyn CostGate>,
    analytics: Arc<dyn AnalyticsSink>,
}

impl ResearchPipeline {
    pub fn new(
        config: TokenscopeConfig,
        llm: Arc<dyn LlmProvider>,
        search: Arc<dyn SearchProvider>,
        cost_gate: Arc<dyn CostGate>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Self {
        let catalog = ModelCatalog::new(&config.llm.capabilities);
        let gateway = LlmGateway::new(llm, &config.llm, config.pipeline.llm_retry);
        Self {
            config,
            catalog,
            gateway,
            search,
            cost_gate,
            analytics,
        }
    }

    pub fn config(&self) -> &TokenscopeConfig {
        &self.config
    }

    /// Upper-end USD estimate for one run at the configured caps.
    pub fn estimate_cost(&self) -> f64 {
        let p = &self.config.pipeline;
        let tiers = &p.tiers;
        let price = |stage: StageKind, calls: usize, input_tokens: usize| {
            let profile = StageProfile::for_stage(stage);
            let model = match profile.model_class {
                ModelClass::Reasoning => &self.config.llm.reasoning_model,
                ModelClass::Fast => &self.config.llm.fast_model,
            };
            self.catalog.lookup(model).cost(input_tokens, profile.base_tokens) * calls as f64
        };

        let sources = tiers.total_cap;
        let standard = tiers.standard_cap.min(sources.saturating_sub(tiers.premium_cap));
        let compressed = sources.saturating_sub(tiers.premium_cap + standard);
        let batches = standard.div_ceil(p.compression.standard_batch_size.max(1))
            + compressed.div_ceil(p.compression.compressed_batch_size.max(1));
        let attempts = p.max_validation_attempts.max(1) as usize;
        let synthesis_in = sources * EST_SUMMARY_TOKENS;
        let report_in = StageProfile::for_stage(StageKind::Synthesis).base_tokens
            + StageProfile::for_stage(StageKind::Speculation).base_tokens;
        let report_tokens = StageProfile::for_stage(StageKind::Assembly).base_tokens;

        price(StageKind::Rerank, 1, p.rerank_preview_limit * 300 / CHARS_PER_TOKEN)
            + price(StageKind::Summarize, batches, EST_SOURCE_TOKENS * p.compression.standard_batch_size)
            + price(StageKind::Extraction, sources, EST_SOURCE_TOKENS)
            + price(StageKind::Synthesis, 1, synthesis_in)
            + price(StageKind::Speculation, 1, StageProfile::for_stage(StageKind::Synthesis).base_tokens)
            + price(StageKind::Assembly, attempts, report_in)
            + price(StageKind::Validation, attempts, report_tokens)
    }

    /// Run the full pipeline for one request.
    pub async fn run(&self, request: &ResearchRequest) -> Result<ResearchReport, ResearchError> {
        if request.name().is_empty() {
            return Err(ResearchError::InvalidRequest {
                message: "project name is required".into(),
            });
        }

        let estimated = self.estimate_cost();
        if !self.cost_gate.can_afford(estimated) {
            return Err(ResearchError::BudgetExceeded { estimated });
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        let meter = UsageMeter::new();
        let mut log = StageLog::new();
        let pipeline = &self.config.pipeline;

        info!(%run_id, project = request.name(), estimated_usd = estimated, "Starting research run");

        // Gathering
        info!(phase = %Phase::Gathering, "Entering phase");
        let gatherer = SourceGatherer::new(self.search.as_ref(), pipeline, &self.config.search);
        let gathered = match gatherer
            .gather(request, &default_stages(request), &mut log)
            .await
        {
            Ok(gathered) => gathered,
            Err(source) => {
                return Err(ResearchError::Search {
                    source,
                    context: Box::new(FailureContext {
                        stages: log.into_records(),
                        extracted: Vec::new(),
                    }),
                });
            }
        };
        if gathered.sources.is_empty() {
            return Err(ResearchError::NoSources {
                project: request.name().to_string(),
                context: Box::new(FailureContext {
                    stages: log.into_records(),
                    extracted: Vec::new(),
                }),
            });
        }
        let sources_unique = gathered.sources.len();

        // Scoring and re-ranking
        info!(phase = %Phase::Ranking, sources = sources_unique, "Entering phase");
        let official = request.website_domain();
        let scored = score_sources(gathered.sources, official.as_deref());
        let average_quality =
            scored.iter().map(|d| d.quality_score as f64).sum::<f64>() / scored.len() as f64;

        let reranked = rerank(&self.gateway, &meter, request, scored, pipeline).await;
        let rerank_status = if reranked.applied {
            StageStatus::Success
        } else if sources_unique > pipeline.rerank_threshold {
            StageStatus::Degraded
        } else {
            StageStatus::Skipped
        };
        log.push(
            StageRecord::new("rerank", rerank_status)
                .with_model(self.gateway.model_for(StageKind::Rerank))
                .metric("candidates", sources_unique)
                .metric("applied", reranked.applied),
        );

        let mut tiered = tier_sources(reranked.sources, &pipeline.tiers);
        let tiers = TierCounts {
            premium: tiered.premium.len(),
            standard: tiered.standard.len(),
            compressed: tiered.compressed.len(),
        };
        log.push(
            StageRecord::new("tiering", StageStatus::Success)
                .metric("premium", tiers.premium)
                .metric("standard", tiers.standard)
                .metric("compressed", tiers.compressed)
                .metric("average_quality", average_quality),
        );

        // Compression
        info!(phase = %Phase::Compression, standard = tiers.standard, compressed = tiers.compressed, "Entering phase");
        let compression_started = Instant::now();
        let mut compression = CompressionStats::default();
        for (docs, mode) in [
            (&mut tiered.standard, CompressionMode::Standard),
            (&mut tiered.compressed, CompressionMode::Compressed),
        ] {
            if docs.is_empty() {
                continue;
            }
            let stats = compress_sources(
                &self.gateway,
                &meter,
                request,
                docs,
                mode,
                &pipeline.compression,
            )
            .await;
            compression.batches += stats.batches;
            compression.failed_batches += stats.failed_batches;
            compression.unsummarized += stats.unsummarized;
        }
        let compression_status = match compression {
            CompressionStats { batches: 0, .. } => StageStatus::Skipped,
            CompressionStats {
                failed_batches: 0,
                unsummarized: 0,
                ..
            } => StageStatus::Success,
            _ => StageStatus::Degraded,
        };
        log.push(
            StageRecord::new("compression", compression_status)
                .with_model(self.gateway.model_for(StageKind::Summarize))
                .metric("batches", compression.batches)
                .metric("failed_batches", compression.failed_batches)
                .metric("unsummarized", compression.unsummarized)
                .metric("duration_ms", compression_started.elapsed().as_millis() as u64),
        );

        let candidates = tiered.into_vec();

        // Extraction
        info!(phase = %Phase::Extraction, sources = candidates.len(), "Entering phase");
        let extraction_model = self.gateway.model_for(StageKind::Extraction).to_string();
        let extraction = extract_all(
            &self.gateway,
            &meter,
            request,
            &candidates,
            pipeline.extraction_concurrency,
        )
        .await;
        let extraction_status = match (extraction.summaries.is_empty(), extraction.failed) {
            (true, _) => StageStatus::Failed,
            (false, 0) => StageStatus::Success,
            (false, _) => StageStatus::Degraded,
        };
        log.push(
            StageRecord::new("extraction", extraction_status)
                .with_model(&extraction_model)
                .metric("extracted", extraction.summaries.len())
                .metric("failed", extraction.failed),
        );
        if extraction.summaries.is_empty() {
            let source = extraction.last_error.unwrap_or(LlmError::EmptyContent {
                model: extraction_model,
            });
            return Err(stage_error(Phase::Extraction, source, log, Vec::new()));
        }
        let extracted = extraction.summaries;

        // Synthesis
        info!(phase = %Phase::Synthesis, summaries = extracted.len(), "Entering phase");
        let notes_len: usize = extracted.iter().map(|s| s.summary.len()).sum();
        let synthesis = self
            .llm_stage(
                StageKind::Synthesis,
                &synthesis_prompt(request, &extracted),
                notes_len,
                &meter,
                &mut log,
            )
            .await;
        let synthesis = match synthesis {
            Ok(text) => text,
            Err(e) => return Err(stage_error(Phase::Synthesis, e, log, extracted)),
        };

        // Speculation
        info!(phase = %Phase::Speculation, "Entering phase");
        let speculation = self
            .llm_stage(
                StageKind::Speculation,
                &speculation_prompt(request, &synthesis),
                synthesis.len(),
                &meter,
                &mut log,
            )
            .await;
        let speculation = match speculation {
            Ok(text) => text,
            Err(e) => return Err(stage_error(Phase::Speculation, e, log, extracted)),
        };

        // Assembly and validation
        info!(phase = %Phase::Assembly, "Entering phase");
        let assembly_model = self.gateway.model_for(StageKind::Assembly).to_string();
        let assembled = match super::validation::assemble_with_validation(
            &self.gateway,
            &meter,
            request,
            &synthesis,
            &speculation,
            pipeline,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                log.push(StageRecord::new("assembly", StageStatus::Failed).with_model(&assembly_model));
                return Err(stage_error(Phase::Assembly, e, log, extracted));
            }
        };
        log.push(
            StageRecord::new("assembly", StageStatus::Success)
                .with_model(&assembly_model)
                .metric("attempts", assembled.attempts)
                .metric("report_chars", assembled.report.len()),
        );
        log.push(
            StageRecord::new(
                "validation",
                if assembled.validation.passed {
                    StageStatus::Success
                } else {
                    StageStatus::Degraded
                },
            )
            .with_model(self.gateway.model_for(StageKind::Validation))
            .metric("passed", assembled.validation.passed)
            .metric("attempts", assembled.attempts),
        );

        let totals = meter.totals();
        let duration = clock.elapsed();
        let confidence = confidence_score(
            log.succeeded_count(),
            log.attempted_count(),
            average_quality,
            assembled.validation.passed,
        );
        let mut report_sources = candidates;
        report_sources.truncate(pipeline.max_report_sources);

        let metadata = ReportMetadata {
            started_at,
            completed_at: Utc::now(),
            duration_ms: duration.as_millis() as u64,
            sources_gathered: gathered.raw_count,
            sources_unique,
            sources_extracted: extracted.len(),
            tiers,
            average_quality,
            reranked: reranked.applied,
            search_queries: gathered.queries_run,
            search_cache_hit_rate: gathered.cache_hit_rate,
            validation_passed: assembled.validation.passed,
            validation_attempts: assembled.attempts,
            validation_issues: assembled.validation.issues,
            usage: totals.usage,
            cost_usd: totals.cost_usd,
            llm_calls: totals.calls,
            confidence_score: confidence,
            stages: log.into_records(),
        };

        self.cost_gate.record_spend(totals.cost_usd);
        self.analytics.record(AnalyticsRecord {
            query: request.name().to_string(),
            results_count: sources_unique,
            duration,
        });

        info!(
            %run_id,
            duration_ms = metadata.duration_ms,
            cost_usd = totals.cost_usd,
            llm_calls = totals.calls,
            validation_passed = metadata.validation_passed,
            "Research run complete"
        );

        Ok(ResearchReport {
            run_id,
            project_name: request.name().to_string(),
            report: assembled.report,
            synthesis,
            speculation,
            sources: report_sources,
            metadata,
        })
    }

    /// A single-call stage, logged either way.
    async fn llm_stage(
        &self,
        stage: StageKind,
        prompt: &str,
        content_len: usize,
        meter: &UsageMeter,
        log: &mut StageLog,
    ) -> Result<String, LlmError> {
        let started = Instant::now();
        let model = self.gateway.model_for(stage).to_string();
        let result = self.gateway.call(stage, prompt, content_len, meter).await;
        let record = match &result {
            Ok(text) => StageRecord::new(stage.as_str(), StageStatus::Success).metric("output_chars", text.len()),
            Err(e) => {
                warn!(stage = %stage, error = %e, "Stage failed");
                StageRecord::new(stage.as_str(), StageStatus::Failed).metric("error", e.to_string())
            }
        };
        log.push(
            record
                .with_model(model)
                .metric("duration_ms", started.elapsed().as_millis() as u64),
        );
        result
    }
}

fn stage_error(
    phase: Phase,
    source: LlmError,
    log: StageLog,
    extracted: Vec<ExtractedSummary>,
) -> ResearchError {
    warn!(%phase, error = %source, extracted = extracted.len(), "Research run failed");
    ResearchError::Stage {
        phase,
        source,
        context: Box::new(FailureContext {
            stages: log.into_records(),
            extracted,
        }),
    }
}
