use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use oc_core::{content_hash64, PerformanceMonitor, TtlLruCache};
use oc_storage::manager::StorageManager;

use crate::classify::{classify_query, QueryType};
use crate::engine::{RetrievalEngine, SearchQuery, SearchResult};
use crate::error::RetrievalError;

/// Default number of distinct queries kept in the result cache.
const DEFAULT_CACHE_CAPACITY: usize = 512;

/// Default cache TTL. Short on purpose: incremental indexing can change
/// rankings at any time, so this absorbs bursts of repeated queries (an IDE
/// re-running the same search as a user types) rather than serving stale
/// results for long.
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Wraps [`RetrievalEngine`] with query classification and a small result
/// cache, the way [`oc_core::cache::TtlLruCache`]'s own doc comment
/// anticipates ("used by ... the retrieval result cache").
///
/// One `SearchCoordinator` is scoped to a single project's [`StorageManager`]
/// — same lifetime relationship `RetrievalEngine` already has — so the cache
/// key doesn't need a `projectId` component; the instance boundary provides
/// it for free.
///
/// Classification itself doesn't filter signals — every [`SearchQuery`]
/// always runs every signal it enables — but it tunes pool sizes and weights
/// so, say, an exact-filename query doesn't pay for a full vector pool it
/// won't need, and a prose query doesn't starve BM25 of candidates chasing
/// an exact match that will never hit.
pub struct SearchCoordinator<'a> {
    engine: RetrievalEngine<'a>,
    cache: Mutex<TtlLruCache<u64, Vec<SearchResult>>>,
    /// Set by a caller wired to a resource-pressure signal (this crate has
    /// no dependency on `oc-indexer`'s `ResourceGuard`, so the trigger lives
    /// one layer up); while set, `search`/`search_raw` shrink `query.limit`
    /// rather than paying full fusion cost during an indexing run under
    /// memory or error pressure.
    degraded: AtomicBool,
    perf: Option<std::sync::Arc<PerformanceMonitor>>,
}

impl<'a> SearchCoordinator<'a> {
    pub fn new(storage: &'a StorageManager) -> Self {
        Self::with_cache(storage, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
    }

    pub fn with_cache(storage: &'a StorageManager, capacity: usize, ttl: Duration) -> Self {
        Self {
            engine: RetrievalEngine::new(storage),
            cache: Mutex::new(TtlLruCache::new(capacity, Some(ttl))),
            degraded: AtomicBool::new(false),
            perf: None,
        }
    }

    /// Attach a [`PerformanceMonitor`] so each `search`/`search_raw` call's
    /// wall-clock duration is recorded under `"search"`. Pure observation —
    /// never changes which results are returned.
    pub fn with_performance_monitor(mut self, perf: std::sync::Arc<PerformanceMonitor>) -> Self {
        self.perf = Some(perf);
        self
    }

    /// Enter or leave degraded mode. A caller with visibility into both this
    /// coordinator and the indexing side's `ResourceGuard` should call this
    /// with `true` when `ResourceGuard::should_use_fallback()` trips, and
    /// `false` once it clears.
    pub fn set_degraded(&self, degraded: bool) {
        self.degraded.store(degraded, Ordering::SeqCst);
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Classify `query.text` and tune pool sizes/weights in place before
    /// running the search. Only nudges fields still at their
    /// `SearchQuery::new` default — a caller that already set a field
    /// explicitly keeps what they asked for.
    pub fn tune_for_query_type(query: &mut SearchQuery) -> QueryType {
        let defaults = SearchQuery::new(query.text.clone());
        let query_type = classify_query(&query.text);

        match query_type {
            QueryType::ExactFilename | QueryType::PathPattern | QueryType::ExtensionSearch => {
                if query.exact_weight == defaults.exact_weight {
                    query.exact_weight = defaults.exact_weight * 1.5;
                }
                if query.vector_pool_size == defaults.vector_pool_size {
                    query.vector_pool_size = (defaults.vector_pool_size / 4).max(10);
                }
                if query.bm25_weight == defaults.bm25_weight {
                    query.bm25_weight = defaults.bm25_weight * 0.7;
                }
            }
            QueryType::GraphRelation => {
                if query.graph_weight == defaults.graph_weight {
                    query.graph_weight = defaults.graph_weight * 1.5;
                }
                if !query.enable_graph_expansion {
                    query.enable_graph_expansion = true;
                }
            }
            QueryType::SemanticDescription => {
                if query.exact_match_pool_size == defaults.exact_match_pool_size {
                    query.exact_match_pool_size = (defaults.exact_match_pool_size / 5).max(5);
                }
                if query.vector_weight == defaults.vector_weight {
                    query.vector_weight = defaults.vector_weight * 1.3;
                }
            }
            QueryType::Hybrid => {}
        }
        query_type
    }

    /// Run a search, classifying and tuning the query first, and caching the
    /// fused result set keyed on every field that can change the answer.
    pub fn search(&self, mut query: SearchQuery) -> Result<Vec<SearchResult>, RetrievalError> {
        Self::tune_for_query_type(&mut query);
        self.search_raw(&query)
    }

    /// Bypass classification/tuning and run `query` exactly as given,
    /// still subject to the result cache and to degraded-mode `k` shrinking.
    pub fn search_raw(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, RetrievalError> {
        let started = std::time::Instant::now();
        let result = self.search_raw_inner(query);
        if let Some(perf) = &self.perf {
            perf.record_operation("search", started.elapsed().as_secs_f64() * 1000.0);
        }
        result
    }

    fn search_raw_inner(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, RetrievalError> {
        let mut query = query.clone();
        if self.is_degraded() {
            query.limit = (query.limit / 2).max(1);
        }
        let key = cache_key(&query);
        if let Some(hit) = self.cache.lock().expect("cache lock poisoned").get(&key) {
            return Ok(hit.clone());
        }
        let results = self.engine.search(&query)?;
        self.cache
            .lock()
            .expect("cache lock poisoned")
            .put(key, results.clone());
        Ok(results)
    }

    /// Drop every cached entry. Callers invalidate on any write to the
    /// underlying project rather than tracking per-query staleness.
    pub fn invalidate(&self) {
        self.cache.lock().expect("cache lock poisoned").clear();
    }

    pub fn engine(&self) -> &RetrievalEngine<'a> {
        &self.engine
    }
}

/// Fold every field that affects a search's outcome into one cache key —
/// the `(queryText, backendSet, k, filterHash)` tuple, with `projectId`
/// implicit in which `SearchCoordinator` instance is called. `query_vector`
/// is hashed by its raw bytes rather than compared for float equality, since
/// two callers embedding the same text should produce bit-identical
/// vectors.
fn cache_key(query: &SearchQuery) -> u64 {
    let mut buf = String::new();
    buf.push_str(&query.text);
    buf.push('\u{0}');
    buf.push_str(query.effective_bm25_text());
    buf.push('\u{0}');
    buf.push_str(&query.exact_queries.join(","));
    buf.push('\u{0}');
    buf.push_str(&query.limit.to_string());
    buf.push('\u{0}');
    if let Some(lang) = &query.language_filter {
        buf.push_str(&format!("{lang:?}"));
    }
    buf.push('\u{0}');
    if let Some(path) = &query.file_path_filter {
        buf.push_str(path);
    }
    buf.push('\u{0}');
    buf.push_str(&format!(
        "{}{}{}{}{}{}{}{}{}{}{}{}{}",
        query.enable_graph_expansion,
        query.graph_depth,
        query.bm25_pool_size,
        query.exact_match_pool_size,
        query.vector_pool_size,
        query.enable_chunk_search,
        query.chunk_bm25_pool_size,
        query.enable_relation_aware_graph,
        query.bm25_weight,
        query.vector_weight,
        query.exact_weight,
        query.chunk_bm25_weight,
        query.graph_weight,
    ));

    let mut hash = content_hash64(buf.as_bytes());
    if let Some(vector) = &query.query_vector {
        let vector_bytes: Vec<u8> = vector.iter().flat_map(|f| f.to_le_bytes()).collect();
        hash ^= content_hash64(&vector_bytes);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use oc_storage::manager::StorageManager;
    use tempfile::TempDir;

    fn setup() -> (TempDir, StorageManager) {
        let tmp = TempDir::new().unwrap();
        let storage = StorageManager::open(tmp.path()).unwrap();
        (tmp, storage)
    }

    #[test]
    fn search_with_performance_monitor_records_duration() {
        let (_tmp, storage) = setup();
        let perf = std::sync::Arc::new(PerformanceMonitor::new());
        let coordinator = SearchCoordinator::new(&storage).with_performance_monitor(perf.clone());
        coordinator.search_raw(&SearchQuery::new("anything")).unwrap();
        let summary = perf.summary("search").unwrap();
        assert_eq!(summary.count, 1);
    }

    #[test]
    fn degraded_mode_shrinks_effective_limit() {
        let (_tmp, storage) = setup();
        let coordinator = SearchCoordinator::new(&storage);
        assert!(!coordinator.is_degraded());

        let mut query = SearchQuery::new("anything");
        query.limit = 20;
        let results = coordinator.search_raw(&query).unwrap();
        assert_eq!(results.len(), 0); // empty project, just exercising the path

        coordinator.set_degraded(true);
        assert!(coordinator.is_degraded());
        coordinator.set_degraded(false);
        assert!(!coordinator.is_degraded());
    }

    #[test]
    fn tune_for_exact_filename_boosts_exact_weight() {
        let mut query = SearchQuery::new("engine.rs");
        let defaults_exact_weight = query.exact_weight;
        let query_type = SearchCoordinator::tune_for_query_type(&mut query);
        assert_eq!(query_type, QueryType::ExactFilename);
        assert!(query.exact_weight > defaults_exact_weight);
    }

    #[test]
    fn tune_for_semantic_description_shrinks_exact_pool() {
        let mut query = SearchQuery::new("where is the request validated");
        let defaults_pool = query.exact_match_pool_size;
        let query_type = SearchCoordinator::tune_for_query_type(&mut query);
        assert_eq!(query_type, QueryType::SemanticDescription);
        assert!(query.exact_match_pool_size < defaults_pool);
    }

    #[test]
    fn tune_for_graph_relation_forces_expansion_on() {
        let mut query = SearchQuery::new("callers of process_data");
        query.enable_graph_expansion = false;
        let query_type = SearchCoordinator::tune_for_query_type(&mut query);
        assert_eq!(query_type, QueryType::GraphRelation);
        assert!(query.enable_graph_expansion);
    }

    #[test]
    fn tune_respects_caller_overrides() {
        let mut query = SearchQuery::new("engine.rs");
        query.exact_weight = 9.9;
        SearchCoordinator::tune_for_query_type(&mut query);
        assert_eq!(query.exact_weight, 9.9);
    }

    #[test]
    fn search_on_empty_project_returns_empty() {
        let (_tmp, storage) = setup();
        let coordinator = SearchCoordinator::new(&storage);
        let results = coordinator.search(SearchQuery::new("anything")).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn identical_queries_hit_the_cache() {
        let (_tmp, storage) = setup();
        let coordinator = SearchCoordinator::new(&storage);
        let first = coordinator.search(SearchQuery::new("lookup_me")).unwrap();
        let second = coordinator.search(SearchQuery::new("lookup_me")).unwrap();
        assert_eq!(first.len(), second.len());
    }

    #[test]
    fn invalidate_clears_cached_entries() {
        let (_tmp, storage) = setup();
        let coordinator = SearchCoordinator::new(&storage);
        coordinator.search(SearchQuery::new("lookup_me")).unwrap();
        coordinator.invalidate();
        assert_eq!(coordinator.cache.lock().unwrap().len(), 0);
    }

    #[test]
    fn different_queries_produce_different_cache_keys() {
        let a = cache_key(&SearchQuery::new("alpha"));
        let b = cache_key(&SearchQuery::new("beta"));
        assert_ne!(a, b);
    }

    #[test]
    fn cache_key_distinguishes_limit() {
        let mut q1 = SearchQuery::new("same_text");
        let mut q2 = SearchQuery::new("same_text");
        q1.limit = 5;
        q2.limit = 50;
        assert_ne!(cache_key(&q1), cache_key(&q2));
    }
}
