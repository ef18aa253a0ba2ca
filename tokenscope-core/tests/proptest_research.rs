//! Property-based tests for the research pipeline's pure steps using proptest.

use proptest::prelude::*;
use std::collections::HashSet;

use tokenscope_core::config::TierConfig;
use tokenscope_core::research::quality::tier_sources;
use tokenscope_core::research::query::expand_queries;
use tokenscope_core::research::sources::{SourceDocument, dedupe, normalize_url, title_key};
use tokenscope_core::research::Tier;

fn arb_doc() -> impl Strategy<Value = SourceDocument> {
    (
        prop::sample::select(vec!["acme", "acme token", "acme news today", "", "other project"]),
        0u8..6,
        "[a-z ]{0,40}",
    )
        .prop_map(|(title, path, content)| {
            SourceDocument::new(title, format!("https://s.io/{}", path), content)
        })
}

// --- Deduplication properties ---

proptest! {
    #[test]
    fn dedupe_never_grows(docs in prop::collection::vec(arb_doc(), 0..30)) {
        let n = docs.len();
        prop_assert!(dedupe(docs).len() <= n);
    }

    #[test]
    fn dedupe_leaves_unique_urls(docs in prop::collection::vec(arb_doc(), 0..30)) {
        let out = dedupe(docs);
        let urls: HashSet<String> = out.iter().map(|d| normalize_url(&d.url)).collect();
        prop_assert_eq!(urls.len(), out.len());
    }

    #[test]
    fn dedupe_leaves_unique_title_keys(docs in prop::collection::vec(arb_doc(), 0..30)) {
        let out = dedupe(docs);
        let keys: Vec<String> = out.iter().filter_map(|d| title_key(&d.title)).collect();
        let unique: HashSet<&String> = keys.iter().collect();
        prop_assert_eq!(unique.len(), keys.len());
    }

    #[test]
    fn dedupe_is_idempotent(docs in prop::collection::vec(arb_doc(), 0..30)) {
        let once = dedupe(docs);
        let twice = dedupe(once.clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn dedupe_only_keeps_input_documents(docs in prop::collection::vec(arb_doc(), 0..30)) {
        let out = dedupe(docs.clone());
        for kept in &out {
            prop_assert!(docs.iter().any(|d| d.url == kept.url && d.content == kept.content));
        }
    }
}

// --- Query expansion properties ---

proptest! {
    #[test]
    fn expansion_keeps_originals_first(
        terms in prop::collection::vec("[A-Za-z0-9 ]{0,20}", 0..6),
        variations in 0usize..6,
    ) {
        let out = expand_queries(&terms, variations);
        prop_assert_eq!(&out[..terms.len()], &terms[..]);
    }

    #[test]
    fn expansion_is_bounded(
        terms in prop::collection::vec("[A-Za-z0-9 ]{0,20}", 0..6),
        variations in 0usize..6,
    ) {
        let out = expand_queries(&terms, variations);
        prop_assert!(out.len() >= terms.len());
        prop_assert!(out.len() <= terms.len() * (variations + 1));
    }

    #[test]
    fn expansion_is_deterministic(
        terms in prop::collection::vec("[A-Za-z]{1,12}", 1..5),
        variations in 0usize..6,
    ) {
        prop_assert_eq!(expand_queries(&terms, variations), expand_queries(&terms, variations));
    }

    #[test]
    fn nonblank_terms_get_every_variation(
        terms in prop::collection::vec("[A-Za-z]{1,12}", 1..5),
        variations in 0usize..6,
    ) {
        let out = expand_queries(&terms, variations);
        prop_assert_eq!(out.len(), terms.len() * (variations + 1));
    }
}

// --- Tiering properties ---

proptest! {
    #[test]
    fn tiers_respect_caps(
        n in 0usize..150,
        premium_cap in 0usize..20,
        standard_cap in 0usize..50,
        total_cap in 0usize..120,
    ) {
        let docs: Vec<SourceDocument> = (0..n)
            .map(|i| SourceDocument::new(format!("t{i}"), format!("https://s.io/{i}"), "body"))
            .collect();
        let caps = TierConfig {
            premium_cap,
            standard_cap,
            total_cap,
            premium_char_cap: 100,
        };
        let tiered = tier_sources(docs, &caps);

        prop_assert!(tiered.premium.len() <= premium_cap);
        prop_assert!(tiered.standard.len() <= standard_cap);
        prop_assert_eq!(tiered.len(), n.min(total_cap));
        prop_assert!(tiered.premium.iter().all(|d| d.tier == Some(Tier::Premium)));
        prop_assert!(tiered.standard.iter().all(|d| d.tier == Some(Tier::Standard)));
        prop_assert!(tiered.compressed.iter().all(|d| d.tier == Some(Tier::Compressed)));
    }

    #[test]
    fn tiering_preserves_rank_order(n in 0usize..60) {
        let docs: Vec<SourceDocument> = (0..n)
            .map(|i| SourceDocument::new(format!("t{i}"), format!("https://s.io/{i}"), "body"))
            .collect();
        let urls: Vec<String> = tier_sources(docs, &TierConfig::default())
            .into_vec()
            .into_iter()
            .map(|d| d.url)
            .collect();
        let expected: Vec<String> = (0..n).map(|i| format!("https://s.io/{i}")).collect();
        prop_assert_eq!(urls, expected);
    }
}
