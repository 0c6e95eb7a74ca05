//! Stale-while-revalidate decorator.
//!
//! Wraps an [`UnderlyingCache`] so that values stay physically stored for
//! `max_stale` past their logical expiry. Reads of a stale value (or of a
//! value elected for early expiration) force a synchronous recomputation; if
//! that recomputation fails with an error that allows it, the stale value is
//! served and a [`StaleCacheUsage`] event is dispatched.
//!
//! # Example
//!
//! ```ignore
//! let cache = StaleCache::new(pool, dispatcher, Duration::from_secs(1800));
//!
//! let read = cache.get("exchange_rates", |item, _save| {
//!     item.expires_after(Duration::from_secs(300));
//!     fetch_rates().map_err(ComputeError::unavailable)
//! }, 1.0)?;
//!
//! if read.is_stale_fallback() {
//!     // rates are older than five minutes, but the upstream is down
//! }
//! ```

use std::any::type_name;
use std::cell::Cell;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use swr_core::{
    add_duration, CacheError, Clock, ComputeError, RandomSource, SwrResult, SystemClock,
    ThreadRandom,
};
use swr_events::{EventDispatcher, StaleCacheUsage};

use super::freshness::{
    is_stale, should_expire_early, validate_beta, validate_key, CacheRead, RefreshReason,
};
use super::item::CacheItem;
use super::traits::{Cacheable, UnderlyingCache};

/// Stale-serving decorator over an underlying cache.
pub struct StaleCache<C> {
    inner: Arc<C>,
    dispatcher: Arc<dyn EventDispatcher>,
    max_stale: Duration,
    default_lifetime: Option<Duration>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    debug_logs: bool,
}

impl<C: UnderlyingCache> StaleCache<C> {
    /// Create a decorator using the system clock and thread-local randomness.
    pub fn new(inner: Arc<C>, dispatcher: Arc<dyn EventDispatcher>, max_stale: Duration) -> Self {
        Self {
            inner,
            dispatcher,
            max_stale,
            default_lifetime: None,
            clock: Arc::new(SystemClock),
            random: Arc::new(ThreadRandom),
            debug_logs: false,
        }
    }

    /// Replace the time source used for staleness and lifetime decisions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the source of early-expiration draws.
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Emit `debug` traces at every refresh decision.
    pub fn with_debug_logs(mut self, enabled: bool) -> Self {
        self.debug_logs = enabled;
        self
    }

    /// Builder form of [`StaleCache::set_default_lifetime`].
    pub fn with_default_lifetime(mut self, lifetime: Duration) -> Self {
        self.set_default_lifetime(lifetime);
        self
    }

    /// Lifetime used for computed entries that carry no explicit expiry.
    ///
    /// Should match the underlying pool's own default lifetime, which the
    /// pool would otherwise apply without the stale window. Each call
    /// replaces the previous value.
    pub fn set_default_lifetime(&mut self, lifetime: Duration) {
        self.default_lifetime = Some(lifetime);
    }

    /// How long past its logical expiry a value may still be served.
    pub fn max_stale(&self) -> Duration {
        self.max_stale
    }

    /// Get the configured default lifetime, if any.
    pub fn default_lifetime(&self) -> Option<Duration> {
        self.default_lifetime
    }

    /// Whether refresh decisions are traced at `debug`.
    pub fn debug_logs_enabled(&self) -> bool {
        self.debug_logs
    }

    /// Get a reference to the underlying cache.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Fetch `key`, computing it on a miss and refreshing it when stale or
    /// elected for early expiration.
    ///
    /// `beta` tunes early expiration: `0.0` disables it, larger values make
    /// it more eager, `f64::INFINITY` forces it whenever the last
    /// computation had a measurable cost.
    ///
    /// # Errors
    ///
    /// - any error of the initial fetch, unchanged;
    /// - errors of a forced refresh, unchanged, unless the compute error is
    ///   [`ComputeError::Unavailable`] with `allow_stale` set, in which case
    ///   the previous value is returned instead.
    pub fn get<V, E, F>(
        &self,
        key: &str,
        mut compute: F,
        beta: f64,
    ) -> Result<CacheRead<V>, CacheError<E>>
    where
        V: Cacheable,
        E: StdError + Send + Sync + 'static,
        F: FnMut(&mut CacheItem, &mut bool) -> Result<V, ComputeError<E>>,
    {
        validate_key(key)?;
        validate_beta(beta)?;

        let computed = Cell::new(false);
        let mut instrumented =
            |item: &mut CacheItem, save: &mut bool| -> Result<V, ComputeError<E>> {
                let value = compute(item, save)?;
                computed.set(true);
                self.extend_lifetime(item);
                Ok(value)
            };

        // beta = 0: the underlying cache must not recompute on its own here
        let (value, metadata) = self.inner.get(key, &mut instrumented, 0.0)?;
        if computed.get() {
            return Ok(CacheRead::computed(value, metadata));
        }

        let now = self.clock.now();
        let reason = if is_stale(&metadata, self.max_stale, now) {
            if self.debug_logs {
                tracing::debug!(cache_key = %key, "Value is stale, try to recompute it");
            }
            RefreshReason::Stale
        } else if should_expire_early(&metadata, self.max_stale, beta, now, self.random.as_ref()) {
            if self.debug_logs {
                tracing::debug!(
                    cache_key = %key,
                    "Value elected to early expiration, try to recompute it"
                );
            }
            RefreshReason::EarlyExpiration
        } else {
            return Ok(CacheRead::hit(value, metadata));
        };

        // beta = inf: force the recomputation
        match self.inner.get(key, &mut instrumented, f64::INFINITY) {
            Ok((fresh, fresh_metadata)) => Ok(CacheRead::refreshed(fresh, fresh_metadata, reason)),
            Err(CacheError::Compute(err)) if err.allows_stale_fallback() => {
                if self.debug_logs {
                    tracing::debug!(cache_key = %key, error = %err, "Fallback to stale mode");
                }
                self.dispatcher
                    .dispatch(StaleCacheUsage::new(err.into_inner(), key));
                Ok(CacheRead::stale_fallback(value, metadata, reason))
            }
            Err(CacheError::Compute(err)) if err.is_unavailable() => {
                if self.debug_logs {
                    tracing::debug!(cache_key = %key, error = %err, "Cannot fallback to stale mode");
                }
                Err(CacheError::Compute(err))
            }
            Err(err) => {
                if self.debug_logs {
                    tracing::debug!(
                        cache_key = %key,
                        error = %err,
                        "Error {} does not allow stale cache, it will be rethrown",
                        error_kind(&err)
                    );
                }
                Err(err)
            }
        }
    }

    /// Remove `key` from the underlying cache.
    pub fn delete(&self, key: &str) -> SwrResult<bool> {
        self.inner.delete(key)
    }

    /// Invalidate tagged entries. Returns `Ok(false)` when the underlying
    /// cache has no tag support.
    pub fn invalidate_tags(&self, tags: &[&str]) -> SwrResult<bool> {
        match self.inner.as_tag_aware() {
            Some(tag_aware) => tag_aware.invalidate_tags(tags),
            None => Ok(false),
        }
    }

    fn extend_lifetime(&self, item: &mut CacheItem) {
        if item.expiry().is_some() {
            item.extend_expiry(self.max_stale);
        } else if let Some(lifetime) = self.default_lifetime {
            let expiry = add_duration(self.clock.now(), lifetime.saturating_add(self.max_stale));
            item.expires_at(Some(expiry));
        }
    }
}

fn error_kind<E>(err: &CacheError<E>) -> &'static str {
    match err {
        CacheError::Compute(_) => type_name::<E>(),
        CacheError::Cache(_) => type_name::<swr_core::SwrError>(),
    }
}

impl<C> fmt::Debug for StaleCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaleCache")
            .field("max_stale", &self.max_stale)
            .field("default_lifetime", &self.default_lifetime)
            .field("debug_logs", &self.debug_logs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::InMemoryPool;
    use chrono::{TimeZone, Utc};
    use swr_core::{FixedRandom, ManualClock};
    use swr_events::InMemoryEventBus;

    #[derive(Debug, PartialEq)]
    struct Down;

    impl fmt::Display for Down {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "down")
        }
    }

    impl StdError for Down {}

    struct Fixture {
        clock: Arc<ManualClock>,
        pool: Arc<InMemoryPool>,
        bus: Arc<InMemoryEventBus>,
        cache: StaleCache<InMemoryPool>,
    }

    fn fixture(max_stale: u64) -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_800_000_000, 0).unwrap()));
        let pool = Arc::new(
            InMemoryPool::new()
                .with_clock(clock.clone())
                .with_random(Arc::new(FixedRandom::new(1.0))),
        );
        let bus = Arc::new(InMemoryEventBus::new());
        let cache = StaleCache::new(pool.clone(), bus.clone(), Duration::from_secs(max_stale))
            .with_clock(clock.clone())
            .with_random(Arc::new(FixedRandom::new(0.5)));
        Fixture {
            clock,
            pool,
            bus,
            cache,
        }
    }

    fn five_minutes(
        value: &'static str,
    ) -> impl FnMut(&mut CacheItem, &mut bool) -> Result<String, ComputeError<Down>> {
        move |item, _save| {
            item.expires_after(Duration::from_secs(300));
            Ok(value.to_string())
        }
    }

    #[test]
    fn test_rejects_empty_key_and_negative_beta() {
        let fx = fixture(60);
        assert!(fx.cache.get("", five_minutes("v"), 1.0).is_err());
        assert!(fx.cache.get("k", five_minutes("v"), -1.0).is_err());
    }

    #[test]
    fn test_fresh_value_extended_by_max_stale() {
        let fx = fixture(60);
        let read = fx.cache.get("k", five_minutes("v1"), 1.0).unwrap();
        assert!(read.was_computed());
        assert_eq!(
            read.metadata().expiry,
            Some(fx.clock.now() + chrono::Duration::seconds(360))
        );
    }

    #[test]
    fn test_served_stale_within_window_then_refreshed() {
        let fx = fixture(60);
        fx.cache.get("k", five_minutes("v1"), 0.0).unwrap();

        // logically expired, physically retained
        fx.clock.advance(Duration::from_secs(330));
        let read = fx.cache.get("k", five_minutes("v2"), 0.0).unwrap();
        assert_eq!(read.value(), "v2");
        assert_eq!(read.outcome(), crate::cache::ReadOutcome::Refreshed(RefreshReason::Stale));
    }

    #[test]
    fn test_stale_fallback_end_to_end() {
        let fx = fixture(60);
        let start = fx.clock.now();
        fx.cache.get("k", five_minutes("v1"), 0.0).unwrap();
        fx.clock.advance(Duration::from_secs(330));

        let read = fx
            .cache
            .get(
                "k",
                |_item: &mut CacheItem, _save: &mut bool| -> Result<String, ComputeError<Down>> {
                    Err(ComputeError::unavailable(Down))
                },
                0.0,
            )
            .unwrap();
        assert_eq!(read.value(), "v1");
        assert!(read.is_stale_fallback());
        assert_eq!(fx.bus.len(), 1);
        assert_eq!(fx.bus.events()[0].key(), "k");
        assert_eq!(fx.pool.len(), 1);

        // the fallback leaves the stored entry as it was
        let (stored, meta) = fx
            .pool
            .get::<String, Down, _>("k", |_, _| Err(ComputeError::fatal(Down)), 0.0)
            .unwrap();
        assert_eq!(stored, "v1");
        assert_eq!(meta.expiry, Some(start + chrono::Duration::seconds(360)));
    }

    #[test]
    fn test_past_window_is_plain_miss() {
        let fx = fixture(60);
        fx.cache.get("k", five_minutes("v1"), 0.0).unwrap();
        fx.clock.advance(Duration::from_secs(400));

        let err = fx
            .cache
            .get(
                "k",
                |_item: &mut CacheItem, _save: &mut bool| -> Result<String, ComputeError<Down>> {
                    Err(ComputeError::unavailable(Down))
                },
                0.0,
            )
            .unwrap_err();
        assert_eq!(err, CacheError::Compute(ComputeError::unavailable(Down)));
        assert!(fx.bus.is_empty());
    }

    #[test]
    fn test_default_lifetime_replaced_on_each_call() {
        let fx = fixture(60);
        let mut cache = fx.cache;
        cache.set_default_lifetime(Duration::from_secs(10));
        cache.set_default_lifetime(Duration::from_secs(20));
        assert_eq!(cache.default_lifetime(), Some(Duration::from_secs(20)));

        let read = cache
            .get(
                "k",
                |_item: &mut CacheItem, _save: &mut bool| -> Result<u32, ComputeError<Down>> { Ok(1) },
                0.0,
            )
            .unwrap();
        assert_eq!(
            read.metadata().expiry,
            Some(fx.clock.now() + chrono::Duration::seconds(80))
        );
    }

    #[test]
    fn test_invalidate_tags_passes_through() {
        let fx = fixture(60);
        fx.cache
            .get(
                "k",
                |item: &mut CacheItem, _save: &mut bool| -> Result<u32, ComputeError<Down>> {
                    item.tag("numbers");
                    Ok(1)
                },
                0.0,
            )
            .unwrap();
        assert!(fx.cache.invalidate_tags(&["numbers"]).unwrap());
        assert!(fx.pool.is_empty());
        assert!(!fx.cache.delete("k").unwrap());
    }

    #[test]
    fn test_debug_impl_hides_collaborators() {
        let fx = fixture(60);
        let debug = format!("{:?}", fx.cache);
        assert!(debug.contains("max_stale"));
    }
}
