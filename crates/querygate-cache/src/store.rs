use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lru::LruCache;
use querygate_core::QueryError;
use serde::{Deserialize, Serialize};

use crate::normalize::CacheKey;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Instant,
    pub ttl: Duration,
    pub hit_count: u64,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
            hit_count: 0,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

/// Point-in-time counters of a [`BoundedCache`]. Counters are cumulative for
/// the life of the cache; `clear` does not reset them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub coalesced: u64,
    pub hit_rate: f64,
}

/// LRU store with per-entry TTL.
///
/// Expired entries are removed lazily when looked up (and by
/// [`cleanup_expired`](BoundedCache::cleanup_expired)). At capacity, inserting a
/// new key evicts the least recently used entry first, so the size never
/// exceeds `max_size`. The schema singleton shares the store under
/// [`CacheKey::schema`] with its own, longer TTL.
pub struct BoundedCache<V> {
    entries: Mutex<LruCache<CacheKey, CacheEntry<V>>>,
    max_size: usize,
    default_ttl: Duration,
    schema_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    coalesced: AtomicU64,
}

impl<V: Clone> BoundedCache<V> {
    pub fn new(max_size: usize, default_ttl: Duration, schema_ttl: Duration) -> Result<Self, QueryError> {
        let capacity = NonZeroUsize::new(max_size).ok_or_else(|| {
            QueryError::Configuration("cache max_size must be greater than zero".to_string())
        })?;
        validate_ttl("default_ttl", default_ttl)?;
        validate_ttl("schema_ttl", schema_ttl)?;
        Ok(Self {
            entries: Mutex::new(LruCache::new(capacity)),
            max_size,
            default_ttl,
            schema_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn schema_ttl(&self) -> Duration {
        self.schema_ttl
    }

    /// Look up a live entry, bumping its recency and hit count.
    ///
    /// A missing or expired entry counts as a miss; an expired one is
    /// dropped on the spot.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let mut entries = self.entries();
        let expired = match entries.get_mut(key) {
            Some(entry) if entry.is_expired() => true,
            Some(entry) => {
                entry.hit_count += 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, hit_count = entry.hit_count, "cache hit");
                return Some(entry.value.clone());
            }
            None => false,
        };
        if expired {
            entries.pop(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "cache entry expired");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Whether a live entry exists. Touches neither recency nor counters.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries()
            .peek(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    /// Insert or overwrite `key`. A zero `ttl` is rejected.
    pub fn set(&self, key: CacheKey, value: V, ttl: Duration) -> Result<(), QueryError> {
        validate_ttl("ttl", ttl)?;
        let mut entries = self.entries();
        if !entries.contains(&key) && entries.len() >= self.max_size {
            if let Some((evicted, _)) = entries.pop_lru() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %evicted, "evicted least recently used entry");
            }
        }
        tracing::debug!(key = %key, ?ttl, "cache set");
        entries.put(key, CacheEntry::new(value, ttl));
        Ok(())
    }

    pub fn set_default(&self, key: CacheKey, value: V) -> Result<(), QueryError> {
        self.set(key, value, self.default_ttl)
    }

    pub fn get_schema(&self) -> Option<V> {
        self.get(&CacheKey::schema())
    }

    pub fn set_schema(&self, value: V) -> Result<(), QueryError> {
        self.set(CacheKey::schema(), value, self.schema_ttl)
    }

    /// Remove a single entry. Returns whether it was present.
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries().pop(key).is_some()
    }

    /// Drop every entry, returning how many there were.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries();
        let removed = entries.len();
        entries.clear();
        removed
    }

    /// Sweep all expired entries, returning how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries();
        let expired: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        self.expirations
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count a request that was served by attaching to another caller's computation.
    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        let size = self.len();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            size,
            max_size: self.max_size,
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
        }
    }

    fn entries(&self) -> MutexGuard<'_, LruCache<CacheKey, CacheEntry<V>>> {
        self.entries.lock().expect("query cache lock poisoned")
    }
}

fn validate_ttl(name: &str, ttl: Duration) -> Result<(), QueryError> {
    if ttl.is_zero() {
        return Err(QueryError::Configuration(format!(
            "{name} must be greater than zero"
        )));
    }
    Ok(())
}
