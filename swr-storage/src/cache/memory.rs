//! In-memory underlying cache pool.
//!
//! A process-local [`UnderlyingCache`] with the same contract as a shared
//! cache pool:
//! - entries carry a physical expiry and the duration of their last
//!   computation;
//! - expired entries are treated as misses and dropped lazily;
//! - at most one compute callback runs per key, and callers that waited on
//!   the key lock reuse the value written by the winner;
//! - positive `beta` enables probabilistic early recomputation, infinite
//!   `beta` forces it.
//!
//! Values are stored as JSON so that a read never shares memory with the
//! caller that produced it.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use swr_core::{
    CacheError, CacheMetadata, Clock, ComputeError, PoolConfig, RandomSource, StorageError,
    SwrResult, SystemClock, ThreadRandom, Timestamp,
};

use super::freshness::{is_due, validate_beta, validate_key};
use super::item::CacheItem;
use super::traits::{CacheStats, Cacheable, TagAwareCache, UnderlyingCache};

#[derive(Debug, Clone)]
struct StoredEntry {
    payload: serde_json::Value,
    expiry: Option<Timestamp>,
    ctime: u64,
    tags: BTreeSet<String>,
    generation: u64,
}

impl StoredEntry {
    fn is_expired(&self, now: Timestamp) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }

    fn metadata(&self) -> CacheMetadata {
        CacheMetadata::new(self.expiry, Some(self.ctime))
    }

    fn decode<V: Cacheable>(&self, key: &str) -> Result<V, StorageError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| StorageError::Deserialization {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    refreshes: AtomicU64,
    evictions: AtomicU64,
}

/// Process-local cache pool.
pub struct InMemoryPool {
    entries: RwLock<HashMap<String, StoredEntry>>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    generation: AtomicU64,
    counters: Counters,
    default_lifetime: Option<Duration>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl Default for InMemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPool {
    /// Create an empty pool with no default lifetime.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            counters: Counters::default(),
            default_lifetime: None,
            clock: Arc::new(SystemClock),
            random: Arc::new(ThreadRandom),
        }
    }

    /// Build a pool from its configuration section.
    pub fn from_config(config: &PoolConfig) -> Self {
        let pool = Self::new();
        match config.default_lifetime() {
            Some(lifetime) => pool.with_default_lifetime(lifetime),
            None => pool,
        }
    }

    /// Lifetime applied to computed entries the callback left unexpiring.
    pub fn with_default_lifetime(mut self, lifetime: Duration) -> Self {
        self.default_lifetime = Some(lifetime);
        self
    }

    /// Replace the time source used for expiry checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the source of early-recomputation draws.
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Get the configured default lifetime, if any.
    pub fn default_lifetime(&self) -> Option<Duration> {
        self.default_lifetime
    }

    /// Number of stored entries, expired ones included until pruned.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) -> SwrResult<()> {
        self.entries
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .clear();
        Ok(())
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn prune(&self) -> SwrResult<usize> {
        let now = self.clock.now();
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        self.counters
            .evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
        Ok(removed)
    }

    /// Snapshot of the usage counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            refreshes: self.counters.refreshes.load(Ordering::Relaxed),
            entry_count: self.len() as u64,
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// Valid entry for `key`. An expired entry is removed and reported as absent.
    fn lookup(&self, key: &str, now: Timestamp) -> Result<Option<StoredEntry>, StorageError> {
        let found = {
            let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.clone())),
                Some(entry) => Some(entry.generation),
                None => None,
            }
        };

        if let Some(generation) = found {
            let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
            // only evict what we saw; a concurrent writer may have replaced it
            if entries.get(key).is_some_and(|e| e.generation == generation) {
                entries.remove(key);
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(cache_key = %key, "Evicted expired entry");
            }
        }
        Ok(None)
    }

    /// Whether a valid entry must be recomputed for this read.
    fn elected(&self, entry: &StoredEntry, beta: f64, now: Timestamp) -> bool {
        if beta == f64::INFINITY {
            return true;
        }
        if beta <= 0.0 {
            return false;
        }
        match entry.expiry {
            Some(deadline) => is_due(deadline, entry.ctime, beta, now, self.random.unit_interval()),
            None => false,
        }
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    fn release_key_lock(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // one reference in the map, one held here
        let unused = Arc::strong_count(&lock) <= 2;
        drop(lock);
        if unused {
            locks.remove(key);
        }
    }

    fn compute_locked<V, E, F>(
        &self,
        key: &str,
        compute: F,
        seen_generation: Option<u64>,
    ) -> Result<(V, CacheMetadata), CacheError<E>>
    where
        V: Cacheable,
        F: FnOnce(&mut CacheItem, &mut bool) -> Result<V, ComputeError<E>>,
    {
        // the previous lock holder may already have written the entry
        if let Some(entry) = self.lookup(key, self.clock.now())? {
            if seen_generation != Some(entry.generation) {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok((entry.decode(key)?, entry.metadata()));
            }
        }

        if seen_generation.is_some() {
            self.counters.refreshes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }

        let mut item = CacheItem::new(key, self.clock.now());
        let mut save = true;
        let started = Instant::now();
        let value = compute(&mut item, &mut save).map_err(CacheError::Compute)?;
        let ctime = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if item.expiry().is_none() {
            if let Some(lifetime) = self.default_lifetime {
                item.expires_after(lifetime);
            }
        }
        let metadata = CacheMetadata::new(item.expiry(), Some(ctime));

        if save {
            let payload =
                serde_json::to_value(&value).map_err(|e| StorageError::Serialization {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
            let entry = StoredEntry {
                payload,
                expiry: item.expiry(),
                ctime,
                tags: item.tags().clone(),
                generation: self.generation.fetch_add(1, Ordering::Relaxed) + 1,
            };
            self.entries
                .write()
                .map_err(|_| StorageError::LockPoisoned)?
                .insert(key.to_string(), entry);
        }

        Ok((value, metadata))
    }
}

impl UnderlyingCache for InMemoryPool {
    fn get<V, E, F>(
        &self,
        key: &str,
        compute: F,
        beta: f64,
    ) -> Result<(V, CacheMetadata), CacheError<E>>
    where
        V: Cacheable,
        F: FnOnce(&mut CacheItem, &mut bool) -> Result<V, ComputeError<E>>,
    {
        validate_key(key)?;
        validate_beta(beta)?;

        let now = self.clock.now();
        let mut seen_generation = None;
        if let Some(entry) = self.lookup(key, now)? {
            if !self.elected(&entry, beta, now) {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok((entry.decode(key)?, entry.metadata()));
            }
            seen_generation = Some(entry.generation);
        }

        let lock = self.key_lock(key);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.compute_locked(key, compute, seen_generation)
        };
        self.release_key_lock(key, lock);
        result
    }

    fn delete(&self, key: &str) -> SwrResult<bool> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.remove(key).is_some())
    }

    fn as_tag_aware(&self) -> Option<&dyn TagAwareCache> {
        Some(self)
    }
}

impl TagAwareCache for InMemoryPool {
    fn invalidate_tags(&self, tags: &[&str]) -> SwrResult<bool> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        let before = entries.len();
        entries.retain(|_, entry| !tags.iter().any(|tag| entry.tags.contains(*tag)));
        tracing::debug!(
            tags = ?tags,
            removed = before - entries.len(),
            "Invalidated tagged entries"
        );
        Ok(true)
    }
}

impl fmt::Debug for InMemoryPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryPool")
            .field("entries", &self.len())
            .field("default_lifetime", &self.default_lifetime)
            .finish_non_exhaustive()
    }
}
