use std::time::Duration;

use oc_core::TtlLruCache;
use rand::Rng;
use xxhash_rust::xxh3::xxh3_128;

use crate::error::IndexerError;

/// Default capacity (entries) for the embedding cache.
const DEFAULT_CACHE_CAPACITY: usize = 8192;
/// Entries older than this are treated as a cache miss even if still present.
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(6 * 60 * 60);

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 100;

/// Source of dense vector embeddings for chunk text. Implementations back
/// onto a local model, a remote API, or (in tests) a deterministic stub.
pub trait EmbeddingProvider: Send + Sync {
    fn dimension(&self) -> usize;
    fn model_id(&self) -> &str;
    /// Embed a batch of texts in one call. Implementations that only
    /// support single-text calls should loop internally.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexerError>;
}

/// Wraps an [`EmbeddingProvider`] with a content-addressed cache and
/// retry/backoff, so repeated indexing runs over mostly-unchanged code
/// don't re-embed identical chunk text.
pub struct EmbeddingGateway {
    provider: Box<dyn EmbeddingProvider>,
    cache: TtlLruCache<u128, Vec<f32>>,
}

impl EmbeddingGateway {
    pub fn new(provider: Box<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            cache: TtlLruCache::new(DEFAULT_CACHE_CAPACITY, Some(DEFAULT_CACHE_TTL)),
        }
    }

    pub fn with_cache_capacity(provider: Box<dyn EmbeddingProvider>, capacity: usize) -> Self {
        Self {
            provider,
            cache: TtlLruCache::new(capacity, Some(DEFAULT_CACHE_TTL)),
        }
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    fn cache_key(&self, text: &str) -> u128 {
        xxh3_128(format!("{}|{}", self.provider.model_id(), text).as_bytes())
    }

    /// Embed `texts`, returning results in the same order. Cache hits skip
    /// the provider entirely; misses are batched into one provider call and
    /// retried with jittered exponential backoff on a retryable failure.
    pub fn embed_batch(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexerError> {
        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut miss_indices = Vec::new();
        let mut miss_texts = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let key = self.cache_key(text);
            match self.cache.get(&key) {
                Some(vec) => results.push(Some(vec.clone())),
                None => {
                    results.push(None);
                    miss_indices.push(i);
                    miss_texts.push(text.clone());
                }
            }
        }

        if !miss_texts.is_empty() {
            let embedded = self.embed_with_retry(&miss_texts)?;
            for (idx, vec) in miss_indices.into_iter().zip(embedded.into_iter()) {
                let key = self.cache_key(&texts[idx]);
                self.cache.put(key, vec.clone());
                results[idx] = Some(vec);
            }
        }

        Ok(results.into_iter().map(|r| r.expect("every index filled")).collect())
    }

    fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexerError> {
        let mut attempt = 0;
        loop {
            match self.provider.embed_batch(texts) {
                Ok(vectors) => return Ok(vectors),
                Err(e) if attempt < MAX_RETRIES && e.is_retryable() => {
                    let backoff_ms = BASE_BACKOFF_MS * 2u64.pow(attempt);
                    let jitter_ms = rand::thread_rng().gen_range(0..backoff_ms.max(1));
                    std::thread::sleep(Duration::from_millis(backoff_ms + jitter_ms));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
