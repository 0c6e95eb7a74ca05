//! Builds stale cache decorators from configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use swr_core::{Clock, ConfigError, RandomSource, SwrConfig, SwrError, SwrResult};
use swr_events::EventDispatcher;

use crate::cache::{InMemoryPool, StaleCache, UnderlyingCache};

/// Named stale cache decorators, one per `decorated_cache_pools` entry.
pub struct StaleCacheRegistry<C> {
    caches: BTreeMap<String, Arc<StaleCache<C>>>,
}

impl<C: UnderlyingCache> StaleCacheRegistry<C> {
    /// Wrap the named pools as configured.
    ///
    /// When a decorator's pool declares a `default_lifetime`, the decorator
    /// receives it too, so that entries the compute callback leaves
    /// unexpiring are still kept for the stale window.
    ///
    /// # Errors
    ///
    /// - the configuration does not validate;
    /// - a referenced pool is declared but missing from `pools`.
    pub fn from_config(
        config: &SwrConfig,
        pools: &BTreeMap<String, Arc<C>>,
        dispatcher: Arc<dyn EventDispatcher>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
    ) -> SwrResult<Self> {
        config.validate()?;

        let mut caches = BTreeMap::new();
        for (id, decorator) in &config.decorated_cache_pools {
            let pool = pools.get(&decorator.cache_pool).ok_or_else(|| {
                SwrError::Config(ConfigError::UnknownPool {
                    decorator: id.clone(),
                    pool: decorator.cache_pool.clone(),
                })
            })?;

            let mut cache =
                StaleCache::new(Arc::clone(pool), Arc::clone(&dispatcher), decorator.max_stale())
                    .with_clock(Arc::clone(&clock))
                    .with_random(Arc::clone(&random))
                    .with_debug_logs(decorator.enable_debug_logs);
            if let Some(lifetime) = config.pool_for(id).and_then(|p| p.default_lifetime()) {
                cache.set_default_lifetime(lifetime);
            }

            tracing::debug!(
                decorator = %id,
                cache_pool = %decorator.cache_pool,
                max_stale_secs = decorator.max_stale,
                "Registered stale cache decorator"
            );
            caches.insert(id.clone(), Arc::new(cache));
        }

        Ok(Self { caches })
    }

    pub fn get(&self, id: &str) -> Option<Arc<StaleCache<C>>> {
        self.caches.get(id).cloned()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.caches.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}

impl<C> fmt::Debug for StaleCacheRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaleCacheRegistry")
            .field("caches", &self.caches.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// One [`InMemoryPool`] per declared pool, sharing `clock` and `random`.
pub fn build_in_memory_pools(
    config: &SwrConfig,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
) -> BTreeMap<String, Arc<InMemoryPool>> {
    config
        .pools
        .iter()
        .map(|(name, pool)| {
            let pool = InMemoryPool::from_config(pool)
                .with_clock(Arc::clone(&clock))
                .with_random(Arc::clone(&random));
            (name.clone(), Arc::new(pool))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use swr_core::{DecoratorConfig, FixedRandom, PoolConfig, SystemClock};
    use swr_events::NoopDispatcher;

    fn config() -> SwrConfig {
        SwrConfig::new()
            .with_pool(
                "app",
                PoolConfig {
                    default_lifetime: Some(600),
                },
            )
            .with_pool("sessions", PoolConfig::default())
            .with_decorator("stale_app", DecoratorConfig::new("app", 1800).with_debug_logs(true))
            .with_decorator("stale_sessions", DecoratorConfig::new("sessions", 60))
    }

    fn build(config: &SwrConfig) -> SwrResult<StaleCacheRegistry<InMemoryPool>> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let random: Arc<dyn RandomSource> = Arc::new(FixedRandom::new(0.5));
        let pools = build_in_memory_pools(config, Arc::clone(&clock), Arc::clone(&random));
        StaleCacheRegistry::from_config(config, &pools, Arc::new(NoopDispatcher), clock, random)
    }

    #[test]
    fn test_builds_one_decorator_per_entry() {
        let registry = build(&config()).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["stale_app", "stale_sessions"]);

        let app = registry.get("stale_app").unwrap();
        assert_eq!(app.max_stale(), Duration::from_secs(1800));
        assert_eq!(app.default_lifetime(), Some(Duration::from_secs(600)));
        assert!(app.debug_logs_enabled());
        assert_eq!(app.inner().default_lifetime(), Some(Duration::from_secs(600)));

        let sessions = registry.get("stale_sessions").unwrap();
        assert_eq!(sessions.default_lifetime(), None);
        assert!(!sessions.debug_logs_enabled());

        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_decorators_share_pool() {
        let config = config().with_decorator("stale_app_short", DecoratorConfig::new("app", 10));
        let registry = build(&config).unwrap();
        let a = registry.get("stale_app").unwrap();
        let b = registry.get("stale_app_short").unwrap();
        assert!(std::ptr::eq(a.inner(), b.inner()));
    }

    #[test]
    fn test_unknown_pool_is_rejected() {
        let config = SwrConfig::new().with_decorator("broken", DecoratorConfig::new("nope", 10));
        let err = build(&config).unwrap_err();
        assert!(matches!(err, SwrError::Config(ConfigError::UnknownPool { .. })));
    }

    #[test]
    fn test_missing_pool_instance_is_rejected() {
        let config = config();
        let pools: BTreeMap<String, Arc<InMemoryPool>> = BTreeMap::new();
        let err = StaleCacheRegistry::from_config(
            &config,
            &pools,
            Arc::new(NoopDispatcher),
            Arc::new(SystemClock),
            Arc::new(FixedRandom::new(0.5)),
        )
        .unwrap_err();
        assert!(matches!(err, SwrError::Config(ConfigError::UnknownPool { .. })));
    }

    #[test]
    fn test_empty_config() {
        let registry = build(&SwrConfig::new()).unwrap();
        assert!(registry.is_empty());
    }
}
