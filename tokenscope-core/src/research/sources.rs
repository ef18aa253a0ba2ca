//! Retrieved source documents and deduplication.
//!
//! A `SourceDocument` is created by a search call and enriched as it moves
//! through scoring, tiering and summarization. Identity is the normalized
//! URL; two documents whose titles share the same first five words are
//! also treated as the same source.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Words of a title compared when checking for near-duplicates.
const TITLE_KEY_WORDS: usize = 5;

/// Quality bucket deciding how much raw content a source keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Full content, up to a char cap.
    Premium,
    /// Detailed batch summary.
    Standard,
    /// Brief batch summary.
    Compressed,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Premium => write!(f, "premium"),
            Tier::Standard => write!(f, "standard"),
            Tier::Compressed => write!(f, "compressed"),
        }
    }
}

/// A web document retrieved for a research run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub title: String,
    pub url: String,
    pub content: String,
    /// 0-100, assigned by the quality scorer.
    #[serde(default)]
    pub quality_score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleaned_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    /// Summary produced by the compression stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_content: Option<String>,
}

impl SourceDocument {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            content: content.into(),
            quality_score: 0,
            cleaned_content: None,
            tier: None,
            extracted_content: None,
        }
    }

    /// Best available text: summary, then cleaned content, then raw content.
    pub fn best_text(&self) -> &str {
        self.extracted_content
            .as_deref()
            .or(self.cleaned_content.as_deref())
            .unwrap_or(&self.content)
    }

    pub fn normalized_url(&self) -> String {
        normalize_url(&self.url)
    }
}

/// Lower-case, trim and strip trailing slashes.
pub fn normalize_url(url: &str) -> String {
    url.trim().to_lowercase().trim_end_matches('/').to_string()
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// First five title words, lower-cased; `None` for an empty title.
pub fn title_key(title: &str) -> Option<String> {
    let words: Vec<String> = title
        .split_whitespace()
        .take(TITLE_KEY_WORDS)
        .map(|w| w.to_lowercase())
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// Remove duplicate sources in a single pass.
///
/// A document is a duplicate of every kept document it shares a normalized
/// URL or title key with. All of them collapse into one entry holding the
/// longest `content` (the earliest on a tie), at the earliest position.
pub fn dedupe(sources: Vec<SourceDocument>) -> Vec<SourceDocument> {
    let input_len = sources.len();
    let mut slots: Vec<Option<SourceDocument>> = Vec::with_capacity(input_len);
    let mut by_url: HashMap<String, usize> = HashMap::new();
    let mut by_title: HashMap<String, usize> = HashMap::new();

    for doc in sources {
        let mut candidate = doc;
        // Slot the candidate came from; `None` while it is a new document.
        let mut position: Option<usize> = None;

        loop {
            let url = candidate.normalized_url();
            let title = title_key(&candidate.title);
            let hit = by_url
                .get(&url)
                .copied()
                .or_else(|| title.as_ref().and_then(|t| by_title.get(t).copied()));
            let Some(idx) = hit else { break };
            let Some(existing) = slots[idx].take() else {
                break;
            };
            forget_keys(&mut by_url, &mut by_title, &existing, idx);

            let existing_is_earlier = position.is_none_or(|p| idx < p);
            let keep_existing = match existing.content.len().cmp(&candidate.content.len()) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Less => false,
                std::cmp::Ordering::Equal => existing_is_earlier,
            };
            if keep_existing {
                candidate = existing;
            }
            position = Some(position.map_or(idx, |p| p.min(idx)));
        }

        let idx = match position {
            Some(idx) => idx,
            None => {
                slots.push(None);
                slots.len() - 1
            }
        };
        by_url.insert(candidate.normalized_url(), idx);
        if let Some(t) = title_key(&candidate.title) {
            by_title.insert(t, idx);
        }
        slots[idx] = Some(candidate);
    }

    let kept: Vec<SourceDocument> = slots.into_iter().flatten().collect();
    debug!(input = input_len, output = kept.len(), "Deduplicated sources");
    kept
}

fn forget_keys(
    by_url: &mut HashMap<String, usize>,
    by_title: &mut HashMap<String, usize>,
    doc: &SourceDocument,
    idx: usize,
) {
    let url = doc.normalized_url();
    if by_url.get(&url) == Some(&idx) {
        by_url.remove(&url);
    }
    if let Some(title) = title_key(&doc.title)
        && by_title.get(&title) == Some(&idx)
    {
        by_title.remove(&title);
    }
}
