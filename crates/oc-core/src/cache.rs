use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache as RawLruCache;

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Bounded LRU cache with an optional per-entry TTL, used by the retrieval
/// result cache and the embedding-gateway cache. Eviction is driven purely
/// by capacity; TTL is enforced lazily on read, matching how the rest of
/// this crate avoids background timers.
pub struct TtlLruCache<K: Hash + Eq, V> {
    inner: RawLruCache<K, Entry<V>>,
    ttl: Option<Duration>,
    stats: CacheStats,
}

impl<K: Hash + Eq, V> TtlLruCache<K, V> {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: RawLruCache::new(capacity),
            ttl,
            stats: CacheStats::default(),
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        let expired = match self.inner.peek(key) {
            Some(entry) => self
                .ttl
                .is_some_and(|ttl| entry.inserted_at.elapsed() > ttl),
            None => {
                self.stats.misses += 1;
                return None;
            }
        };
        if expired {
            self.inner.pop(key);
            self.stats.misses += 1;
            return None;
        }
        self.stats.hits += 1;
        self.inner.get(key).map(|e| &e.value)
    }

    pub fn put(&mut self, key: K, value: V) {
        let evicted = self.inner.put(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
        if evicted.is_some() {
            self.stats.evictions += 1;
        }
    }

    pub fn invalidate(&mut self, key: &K) {
        self.inner.pop(key);
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
