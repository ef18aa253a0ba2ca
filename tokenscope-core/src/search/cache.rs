//! In-process LRU cache in front of a search provider.

use super::{SearchOptions, SearchProvider, SearchResponse, sanitize_query};
use crate::error::SearchError;
use crate::research::sources::SourceDocument;
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
struct CacheStats {
    lookups: u64,
    hits: u64,
}

impl CacheStats {
    fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

struct CacheState {
    entries: LruCache<(String, SearchOptions), Vec<SourceDocument>>,
    stats: CacheStats,
}

/// Wraps a provider and answers repeated queries from memory.
///
/// Keys are the sanitized query plus the full options. Errors and empty
/// results are not cached.
pub struct CachingSearchProvider {
    inner: Arc<dyn SearchProvider>,
    state: Mutex<CacheState>,
}

impl CachingSearchProvider {
    pub fn new(inner: Arc<dyn SearchProvider>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Fraction of lookups served from cache.
    pub fn hit_rate(&self) -> f64 {
        self.lock().stats.hit_rate()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SearchProvider for CachingSearchProvider {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchResponse, SearchError> {
        let key = (sanitize_query(query), options.clone());

        {
            let mut state = self.lock();
            state.stats.lookups += 1;
            if let Some(results) = state.entries.get(&key).cloned() {
                state.stats.hits += 1;
                debug!(query = %key.0, "Search cache hit");
                return Ok(SearchResponse {
                    results,
                    total_queries: state.stats.lookups,
                    cache_hit_rate: state.stats.hit_rate(),
                });
            }
        }

        let response = self.inner.search(query, options).await?;

        let mut state = self.lock();
        if !response.results.is_empty() {
            state.entries.put(key, response.results.clone());
        }
        Ok(SearchResponse {
            results: response.results,
            total_queries: state.stats.lookups,
            cache_hit_rate: state.stats.hit_rate(),
        })
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SearchProvider for CountingProvider {
        async fn search(
            &self,
            query: &str,
            _options: &SearchOptions,
        ) -> Result<SearchResponse, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if query.contains("empty") {
                return Ok(SearchResponse::empty());
            }
            Ok(SearchResponse {
                results: vec![SourceDocument::new(query, format!("https://x.io/{}", query.len()), "c")],
                total_queries: 1,
                cache_hit_rate: 0.0,
            })
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_repeated_query_hits_cache() {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let cache = CachingSearchProvider::new(inner.clone(), 8);
        let opts = SearchOptions::default();

        cache.search("acme token", &opts).await.unwrap();
        let second = cache.search("  acme   token ", &opts).await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.results.len(), 1);
        assert_eq!(second.total_queries, 2);
        assert!((second.cache_hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_empty_results_are_not_cached() {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let cache = CachingSearchProvider::new(inner.clone(), 8);
        let opts = SearchOptions::default();
        cache.search("empty", &opts).await.unwrap();
        cache.search("empty", &opts).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.hit_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_options_are_part_of_the_key() {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let cache = CachingSearchProvider::new(inner.clone(), 8);
        cache.search("acme", &SearchOptions::default()).await.unwrap();
        let advanced = SearchOptions {
            depth: crate::search::SearchDepth::Advanced,
            ..SearchOptions::default()
        };
        cache.search("acme", &advanced).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
