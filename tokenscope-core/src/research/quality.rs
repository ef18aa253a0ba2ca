//! Content cleaning, quality scoring and tiering.

use super::sources::{SourceDocument, Tier, truncate_chars};
use crate::config::TierConfig;
use regex::Regex;
use std::sync::LazyLock;

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static MD_IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());
static MD_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
static BOILERPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(accept (all )?cookies|subscribe to our newsletter|all rights reserved|sign up for free)[^.\n]*[.\n]?")
        .unwrap()
});
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\r\f]+").unwrap());
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n+").unwrap());

const TITLE_KEYWORDS: &[&str] = &["analysis", "review", "report", "research"];
const BODY_KEYWORDS: &[&str] = &["tokenomics", "whitepaper", "audit", "roadmap"];

/// Crypto news, data and documentation domains given an authority bonus.
const REPUTABLE_DOMAINS: &[&str] = &[
    "coindesk.com",
    "cointelegraph.com",
    "theblock.co",
    "decrypt.co",
    "messari.io",
    "coingecko.com",
    "coinmarketcap.com",
    "defillama.com",
    "etherscan.io",
    "github.com",
    "binance.com",
    "bitcoinmagazine.com",
    "blockworks.co",
    "certik.com",
    "gitbook.io",
];

const LENGTH_POINTS_MAX: f64 = 30.0;
const CHARS_PER_LENGTH_POINT: f64 = 100.0;
const TITLE_POINTS: f64 = 15.0;
const DOMAIN_POINTS: f64 = 25.0;
const BODY_POINTS_EACH: f64 = 7.5;
const BODY_POINTS_MAX: f64 = 30.0;

/// Strip markup and boilerplate and normalize whitespace.
pub fn clean_content(raw: &str) -> String {
    let text = HTML_TAG.replace_all(raw, " ");
    let text = MD_IMAGE.replace_all(&text, "");
    let text = MD_LINK.replace_all(&text, "$1");
    let text = BOILERPLATE.replace_all(&text, "");
    let text = WHITESPACE.replace_all(&text, " ");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn host_of(url: &str) -> Option<String> {
    let host = url::Url::parse(url.trim()).ok()?.host_str()?.to_lowercase();
    Some(host.trim_start_matches("www.").to_string())
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// Score a document 0-100 from its cleaned content, title and host.
///
/// `official_domain` (the project's own site) earns the same bonus as
/// the reputable list.
pub fn quality_score(doc: &SourceDocument, official_domain: Option<&str>) -> u8 {
    let body = doc.cleaned_content.as_deref().unwrap_or(&doc.content);
    let mut score = (body.chars().count() as f64 / CHARS_PER_LENGTH_POINT).min(LENGTH_POINTS_MAX);

    let title = doc.title.to_lowercase();
    if TITLE_KEYWORDS.iter().any(|k| title.contains(k)) {
        score += TITLE_POINTS;
    }

    if let Some(host) = host_of(&doc.url) {
        let reputable = REPUTABLE_DOMAINS.iter().any(|d| domain_matches(&host, d))
            || official_domain.is_some_and(|d| domain_matches(&host, d));
        if reputable {
            score += DOMAIN_POINTS;
        }
    }

    let lower = body.to_lowercase();
    let hits = BODY_KEYWORDS.iter().filter(|k| lower.contains(*k)).count();
    score += (hits as f64 * BODY_POINTS_EACH).min(BODY_POINTS_MAX);

    score.round().clamp(0.0, 100.0) as u8
}

/// Clean and score every source, then sort by descending score.
/// The sort is stable, so equal scores keep retrieval order.
pub fn score_sources(mut sources: Vec<SourceDocument>, official_domain: Option<&str>) -> Vec<SourceDocument> {
    for doc in &mut sources {
        doc.cleaned_content = Some(clean_content(&doc.content));
        doc.quality_score = quality_score(doc, official_domain);
    }
    sources.sort_by(|a, b| b.quality_score.cmp(&a.quality_score));
    sources
}

/// Disjoint premium/standard/compressed partition of ranked sources.
#[derive(Debug, Clone, Default)]
pub struct TieredSources {
    pub premium: Vec<SourceDocument>,
    pub standard: Vec<SourceDocument>,
    pub compressed: Vec<SourceDocument>,
}

impl TieredSources {
    pub fn len(&self) -> usize {
        self.premium.len() + self.standard.len() + self.compressed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All sources in tier order.
    pub fn iter(&self) -> impl Iterator<Item = &SourceDocument> {
        self.premium
            .iter()
            .chain(self.standard.iter())
            .chain(self.compressed.iter())
    }

    pub fn into_vec(self) -> Vec<SourceDocument> {
        let mut all = self.premium;
        all.extend(self.standard);
        all.extend(self.compressed);
        all
    }
}

/// Partition an already ranked list. Tier sizes come from the actual
/// count and never exceed the configured caps; sources past the total cap
/// are dropped.
pub fn tier_sources(ranked: Vec<SourceDocument>, caps: &TierConfig) -> TieredSources {
    let total = ranked.len().min(caps.total_cap);
    let premium_len = caps.premium_cap.min(total);
    let standard_len = caps.standard_cap.min(total - premium_len);

    let mut tiered = TieredSources::default();
    for (i, mut doc) in ranked.into_iter().take(total).enumerate() {
        if i < premium_len {
            doc.tier = Some(Tier::Premium);
            let text = doc.cleaned_content.as_deref().unwrap_or(&doc.content);
            doc.cleaned_content = Some(truncate_chars(text, caps.premium_char_cap).to_string());
            tiered.premium.push(doc);
        } else if i < premium_len + standard_len {
            doc.tier = Some(Tier::Standard);
            tiered.standard.push(doc);
        } else {
            doc.tier = Some(Tier::Compressed);
            tiered.compressed.push(doc);
        }
    }
    tiered
}
