//! Prompt builders for every LLM stage.

use super::extraction::ExtractedSummary;
use super::request::ResearchRequest;
use super::sources::{SourceDocument, truncate_chars};
use std::fmt::Write;

/// Sections the final report must contain, in order.
pub const REQUIRED_SECTIONS: &[&str] = &[
    "Executive Summary",
    "Project Overview",
    "Technology & Architecture",
    "Tokenomics",
    "Team & Backers",
    "Roadmap & Development Activity",
    "Market & Community",
    "Risks & Red Flags",
    "Speculative Outlook",
    "Sources",
];

/// Chars of each source shown in the re-ranking preview.
const RERANK_SNIPPET_CHARS: usize = 200;

/// Chars of source text given to a single extraction call.
const EXTRACTION_INPUT_CHARS: usize = 12_000;

/// Chars of each source given to a summarization batch.
const BATCH_INPUT_CHARS: usize = 4_000;

fn sections_list() -> String {
    REQUIRED_SECTIONS
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Numbered preview of sources (1-based) for relevance ordering.
pub fn rerank_prompt(request: &ResearchRequest, sources: &[SourceDocument]) -> String {
    let mut prompt = format!(
        "You are ranking web sources for a research report on a crypto project.\n\
         {}\n\n\
         Order the sources below from most to least relevant and reliable for that report.\n\
         Respond with a JSON array of source numbers only, for example [3, 1, 2].\n\n",
        request.context_lines()
    );
    for (i, doc) in sources.iter().enumerate() {
        let snippet = truncate_chars(doc.best_text(), RERANK_SNIPPET_CHARS).replace('\n', " ");
        let _ = writeln!(prompt, "{}. {} ({})\n   {}", i + 1, doc.title, doc.url, snippet);
    }
    prompt
}

/// Batch summarization prompt. Each answer must start with `SOURCE <n>:`.
pub fn compression_prompt(
    request: &ResearchRequest,
    batch: &[SourceDocument],
    detailed: bool,
    target_chars: usize,
) -> String {
    let framing = if detailed {
        "Write a detailed summary of each source covering every aspect relevant to the project: \
         technology, tokenomics, team, funding, roadmap, market data and risks."
    } else {
        "Write a brief, fact-dense summary of each source. Keep only concrete facts, figures and names."
    };
    let mut prompt = format!(
        "{}\nProject context:\n{}\n\n\
         Keep each summary under {} characters. Start each summary on its own line with \
         `SOURCE <n>:` using the numbers below, one summary per source, in order.\n\n",
        framing,
        request.context_lines(),
        target_chars
    );
    for (i, doc) in batch.iter().enumerate() {
        let text = doc.cleaned_content.as_deref().unwrap_or(&doc.content);
        let _ = write!(
            prompt,
            "SOURCE {}: {} ({})\n{}\n\n",
            i + 1,
            doc.title,
            doc.url,
            truncate_chars(text, BATCH_INPUT_CHARS)
        );
    }
    prompt
}

/// Per-source fact extraction.
pub fn extraction_prompt(request: &ResearchRequest, doc: &SourceDocument) -> String {
    format!(
        "Extract every fact in this source that is relevant to researching the project below. \
         Include figures, dates, names, token details, audits, partnerships and risks. \
         Do not speculate. If the source is irrelevant, say so in one line.\n\n\
         {}\n\nSource: {} ({})\n\n{}",
        request.context_lines(),
        doc.title,
        doc.url,
        truncate_chars(doc.best_text(), EXTRACTION_INPUT_CHARS)
    )
}

/// Factual synthesis over all extracted summaries.
pub fn synthesis_prompt(request: &ResearchRequest, extracted: &[ExtractedSummary]) -> String {
    let mut prompt = format!(
        "Write a purely factual research synthesis for the project below using only the \
         extracted source notes. Cite sources as [n]. Cover every one of these sections, \
         stating explicitly when the notes contain no information for a section:\n{}\n\n{}\n\n\
         Source notes:\n",
        sections_list(),
        request.context_lines()
    );
    for (i, summary) in extracted.iter().enumerate() {
        let _ = write!(
            prompt,
            "[{}] {} ({}, {})\n{}\n\n",
            i + 1,
            summary.title,
            summary.url,
            summary.tier,
            summary.summary
        );
    }
    prompt
}

/// Speculative layer built on the synthesis.
pub fn speculation_prompt(request: &ResearchRequest, synthesis: &str) -> String {
    format!(
        "Using the factual synthesis below, write a clearly labelled speculative analysis for \
         the project: plausible scenarios, catalysts, price and adoption drivers, and the risks \
         that would invalidate them. Mark every statement as speculation and never restate \
         speculation as fact.\n\n{}\n\nFactual synthesis:\n{}",
        request.context_lines(),
        synthesis
    )
}

/// Final report assembly. `feedback` carries the previous review's issues.
pub fn assembly_prompt(
    request: &ResearchRequest,
    synthesis: &str,
    speculation: &str,
    feedback: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Assemble the final research report for the project below in Markdown.\n\
         The report MUST contain these section headers, in this order:\n{}\n\n\
         Keep facts and speculation clearly separated; speculative content belongs only in the \
         Speculative Outlook section.\n\n{}\n\n\
         Factual synthesis:\n{}\n\nSpeculative analysis:\n{}\n",
        sections_list(),
        request.context_lines(),
        synthesis,
        speculation
    );
    if let Some(issues) = feedback.filter(|f| !f.trim().is_empty()) {
        let _ = write!(
            prompt,
            "\nA previous draft failed review. Fix these issues:\n{}\n",
            issues
        );
    }
    prompt
}

/// Review of a report or a chunk of one.
pub fn validation_prompt(report_part: &str, chunk: Option<(usize, usize)>) -> String {
    let scope = match chunk {
        Some((i, n)) => format!("This is part {} of {} of the report; judge only this part.\n", i, n),
        None => String::new(),
    };
    format!(
        "Review the research report text below.\n{}\
         Check that it is coherent, keeps speculation separate from facts, contains no obvious \
         contradictions or placeholder text, and that section headers present are well formed.\n\
         Answer with PASS or FAIL on the first line, followed by the reasons.\n\n{}",
        scope, report_part
    )
}
