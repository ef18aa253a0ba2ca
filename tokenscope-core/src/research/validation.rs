//! Report review and the bounded re-assembly loop.
//!
//! Validation is advisory: a report that still fails after the last
//! allowed assembly is returned anyway, with the verdict recorded.

use super::prompts::{assembly_prompt, validation_prompt};
use super::request::ResearchRequest;
use super::sources::truncate_chars;
use crate::brain::{LlmGateway, UsageMeter};
use crate::config::PipelineConfig;
use crate::error::LlmError;
use crate::types::StageKind;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Verdict of one review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub issues: String,
}

impl ValidationResult {
    fn failed(issues: impl Into<String>) -> Self {
        Self {
            passed: false,
            issues: issues.into(),
        }
    }
}

/// Leading verdict word of the answer's first line, with markdown and
/// punctuation stripped.
fn verdict_word(line: &str) -> String {
    line.trim_start_matches(|c: char| !c.is_alphanumeric())
        .split(|c: char| !c.is_alphanumeric())
        .next()
        .unwrap_or("")
        .to_uppercase()
}

/// Read a PASS/FAIL verdict from the first word of the answer. Anything
/// other than a leading PASS or FAIL is a failure.
pub fn parse_verdict(answer: &str) -> ValidationResult {
    let trimmed = answer.trim();
    let (first, rest) = trimmed.split_once('\n').unwrap_or((trimmed, ""));
    let issues = if rest.trim().is_empty() {
        trimmed.to_string()
    } else {
        rest.trim().to_string()
    };

    match verdict_word(first).as_str() {
        "PASS" | "PASSED" => ValidationResult {
            passed: true,
            issues: String::new(),
        },
        "FAIL" | "FAILED" => ValidationResult::failed(issues),
        _ => ValidationResult::failed(format!("Unrecognized verdict: {}", issues)),
    }
}

/// Split on paragraph boundaries into chunks of at most `chunk_size` chars.
/// A single paragraph longer than that is split on char boundaries.
pub fn chunk_report(report: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    let push_piece = |piece: &str, current: &mut String, chunks: &mut Vec<String>| {
        let sep = if current.is_empty() { 0 } else { 2 };
        if current.chars().count() + sep + piece.chars().count() > chunk_size && !current.is_empty() {
            chunks.push(std::mem::take(current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(piece);
    };

    for paragraph in report.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let mut rest = paragraph;
        while rest.chars().count() > chunk_size {
            let head = truncate_chars(rest, chunk_size);
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.push(head.to_string());
            rest = &rest[head.len()..];
        }
        if !rest.is_empty() {
            push_piece(rest, &mut current, &mut chunks);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Review a report, chunk by chunk when it exceeds the chunking threshold.
pub async fn validate_report(
    gateway: &LlmGateway,
    meter: &UsageMeter,
    report: &str,
    config: &PipelineConfig,
) -> Result<ValidationResult, LlmError> {
    if report.chars().count() <= config.validation_chunk_threshold {
        let prompt = validation_prompt(report, None);
        let answer = gateway
            .call(StageKind::Validation, &prompt, report.len(), meter)
            .await?;
        return Ok(parse_verdict(&answer));
    }

    let chunks = chunk_report(report, config.validation_chunk_size);
    let total = chunks.len();
    let mut issues = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let prompt = validation_prompt(chunk, Some((i + 1, total)));
        let answer = gateway
            .call(StageKind::Validation, &prompt, chunk.len(), meter)
            .await?;
        let verdict = parse_verdict(&answer);
        if !verdict.passed {
            issues.push(format!("Part {}: {}", i + 1, verdict.issues));
        }
    }

    Ok(if issues.is_empty() {
        ValidationResult {
            passed: true,
            issues: String::new(),
        }
    } else {
        ValidationResult::failed(issues.join("\n"))
    })
}

/// Output of the assembly/validation loop.
#[derive(Debug, Clone)]
pub struct AssemblyOutcome {
    pub report: String,
    pub validation: ValidationResult,
    /// Assembly calls made, never more than the configured maximum.
    pub attempts: u32,
}

/// Assemble the report, then review and re-assemble with the review's
/// issues until it passes or the attempt limit is reached.
///
/// Only assembly errors are returned; a failed review call ends the loop
/// and is recorded as a failed verdict.
pub async fn assemble_with_validation(
    gateway: &LlmGateway,
    meter: &UsageMeter,
    request: &ResearchRequest,
    synthesis: &str,
    speculation: &str,
    config: &PipelineConfig,
) -> Result<AssemblyOutcome, LlmError> {
    let max_attempts = config.max_validation_attempts.max(1);
    let content_len = synthesis.len() + speculation.len();
    let mut feedback: Option<String> = None;
    let mut attempts = 0;

    loop {
        let prompt = assembly_prompt(request, synthesis, speculation, feedback.as_deref());
        let report = gateway
            .call(StageKind::Assembly, &prompt, content_len, meter)
            .await?;
        attempts += 1;

        let validation = match validate_report(gateway, meter, &report, config).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, attempt = attempts, "Validation call failed, accepting report");
                return Ok(AssemblyOutcome {
                    report,
                    validation: ValidationResult::failed(format!("Validation unavailable: {}", e)),
                    attempts,
                });
            }
        };

        info!(attempt = attempts, passed = validation.passed, "Report reviewed");
        if validation.passed || attempts >= max_attempts {
            if !validation.passed {
                warn!(attempts, "Report still failing review after final attempt");
            }
            return Ok(AssemblyOutcome {
                report,
                validation,
                attempts,
            });
        }
        feedback = Some(validation.issues);
    }
}
