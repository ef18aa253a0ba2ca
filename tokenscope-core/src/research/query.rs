//! Query expansion.
//!
//! Turns base search terms into the query list for a search stage. Pure and
//! deterministic: the originals come first, unmodified, followed by up to
//! `variations` keyword-suffixed or exact-phrase variants per term.

/// Suffixes appended to base terms, rotated by term position.
const SUFFIXES: &[&str] = &[
    "tokenomics breakdown",
    "team funding investors",
    "roadmap partnerships",
    "security audit",
    "price analysis",
    "community sentiment",
    "whitepaper technology",
    "risks concerns",
];

/// Variant index reserved for the exact-phrase form.
const PHRASE_VARIANT: usize = 1;

/// Expand `terms` into queries.
///
/// Output length is between `terms.len()` and `terms.len() * (variations + 1)`.
pub fn expand_queries<S: AsRef<str>>(terms: &[S], variations: usize) -> Vec<String> {
    let mut queries: Vec<String> = terms.iter().map(|t| t.as_ref().to_string()).collect();

    for (term_idx, term) in terms.iter().enumerate() {
        let term = term.as_ref().trim();
        if term.is_empty() {
            continue;
        }
        for v in 0..variations {
            let variant = if v == PHRASE_VARIANT && !term.contains('"') {
                format!("\"{}\"", term)
            } else {
                let suffix = SUFFIXES[(term_idx + v) % SUFFIXES.len()];
                format!("{} {}", term, suffix)
            };
            queries.push(variant);
        }
    }

    queries
}
