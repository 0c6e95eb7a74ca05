//! Underlying cache traits and cacheable value marker.
//!
//! The stale decorator never stores anything itself. It drives an
//! [`UnderlyingCache`] that owns entries, persistence and per-key locking.

use serde::{de::DeserializeOwned, Serialize};
use swr_core::{CacheError, CacheMetadata, ComputeError, SwrResult};

use super::item::CacheItem;

/// Marker trait for values that can be cached.
///
/// Implementations must be `Clone`, `Serialize` and `DeserializeOwned` so
/// that backends can persist them, and `Send + Sync + 'static` so that
/// caches can be shared across threads. Every type meeting those bounds is
/// cacheable.
pub trait Cacheable: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Cacheable for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Compute-or-fetch cache engine.
///
/// # Contract
///
/// - At most one compute callback runs concurrently per key.
/// - `beta == 0.0` never recomputes a valid entry.
/// - `beta == f64::INFINITY` always recomputes, even on a hit.
/// - Any other positive `beta` may elect a valid entry for early
///   recomputation (probabilistic early expiration).
/// - A failing callback leaves the stored entry untouched and its error is
///   returned as [`CacheError::Compute`].
pub trait UnderlyingCache: Send + Sync {
    /// Return the cached value for `key`, computing it with `compute` when
    /// the entry is missing, expired or elected for recomputation.
    ///
    /// The callback receives the item handle (to set expiry and tags) and a
    /// "save" flag it may clear to skip persisting the value.
    fn get<V, E, F>(
        &self,
        key: &str,
        compute: F,
        beta: f64,
    ) -> Result<(V, CacheMetadata), CacheError<E>>
    where
        V: Cacheable,
        F: FnOnce(&mut CacheItem, &mut bool) -> Result<V, ComputeError<E>>;

    /// Remove one entry. Returns whether an entry existed.
    fn delete(&self, key: &str) -> SwrResult<bool>;

    /// Tag invalidation capability, if the engine supports it.
    fn as_tag_aware(&self) -> Option<&dyn TagAwareCache> {
        None
    }
}

/// Optional capability: invalidate every entry carrying any of the tags.
pub trait TagAwareCache: Send + Sync {
    fn invalidate_tags(&self, tags: &[&str]) -> SwrResult<bool>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of reads answered from a stored entry.
    pub hits: u64,
    /// Number of reads that found no valid entry.
    pub misses: u64,
    /// Number of valid entries recomputed on request (forced or early).
    pub refreshes: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Number of entries dropped because they expired.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    fn assert_cacheable<T: Cacheable>() {}

    #[test]
    fn test_common_types_are_cacheable() {
        assert_cacheable::<String>();
        assert_cacheable::<Vec<u64>>();
        assert_cacheable::<std::collections::BTreeMap<String, f64>>();
        assert_cacheable::<Option<(i32, bool)>>();
    }
}
