//! Configuration types
//!
//! Describes which underlying cache pools exist and which stale-serving
//! decorators wrap them. Loaded from TOML:
//!
//! ```toml
//! [pools.app]
//! default_lifetime = 600
//!
//! [decorated_cache_pools.stale_app]
//! cache_pool = "app"
//! max_stale = 1800
//! enable_debug_logs = true
//! ```

use crate::error::{ConfigError, SwrError, SwrResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Underlying cache pool settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Lifetime in seconds applied by the pool to entries without an explicit expiry.
    #[serde(default)]
    pub default_lifetime: Option<u64>,
}

impl PoolConfig {
    pub fn default_lifetime(&self) -> Option<Duration> {
        self.default_lifetime.map(Duration::from_secs)
    }
}

/// One stale-serving decorator over a named pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecoratorConfig {
    /// Name of the pool in [`SwrConfig::pools`] this decorator wraps.
    pub cache_pool: String,
    /// Seconds past logical expiry during which a value may still be served.
    pub max_stale: u64,
    #[serde(default)]
    pub enable_debug_logs: bool,
}

impl DecoratorConfig {
    pub fn new(cache_pool: impl Into<String>, max_stale: u64) -> Self {
        Self {
            cache_pool: cache_pool.into(),
            max_stale,
            enable_debug_logs: false,
        }
    }

    pub fn with_debug_logs(mut self, enabled: bool) -> Self {
        self.enable_debug_logs = enabled;
        self
    }

    pub fn max_stale(&self) -> Duration {
        Duration::from_secs(self.max_stale)
    }
}

/// Master configuration struct.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwrConfig {
    #[serde(default)]
    pub pools: BTreeMap<String, PoolConfig>,
    #[serde(default)]
    pub decorated_cache_pools: BTreeMap<String, DecoratorConfig>,
}

impl SwrConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a pool definition.
    pub fn with_pool(mut self, name: impl Into<String>, pool: PoolConfig) -> Self {
        self.pools.insert(name.into(), pool);
        self
    }

    /// Add or replace a decorator definition.
    pub fn with_decorator(mut self, id: impl Into<String>, decorator: DecoratorConfig) -> Self {
        self.decorated_cache_pools.insert(id.into(), decorator);
        self
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> SwrResult<Self> {
        let config: Self = toml::from_str(input).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> SwrResult<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&input)
    }

    pub fn to_toml_string(&self) -> SwrResult<String> {
        toml::to_string(self).map_err(|e| {
            SwrError::Config(ConfigError::Parse {
                reason: e.to_string(),
            })
        })
    }

    /// Pool settings for a decorator, if its pool is declared.
    pub fn pool_for(&self, decorator_id: &str) -> Option<&PoolConfig> {
        self.decorated_cache_pools
            .get(decorator_id)
            .and_then(|d| self.pools.get(&d.cache_pool))
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - pool and decorator ids are non-empty
    /// - every decorator names a non-empty, declared pool
    pub fn validate(&self) -> SwrResult<()> {
        if let Some(name) = self.pools.keys().find(|name| name.trim().is_empty()) {
            return Err(SwrError::Config(ConfigError::InvalidValue {
                field: "pools".to_string(),
                value: format!("{:?}", name),
                reason: "pool name cannot be empty".to_string(),
            }));
        }

        for (id, decorator) in &self.decorated_cache_pools {
            if id.trim().is_empty() {
                return Err(SwrError::Config(ConfigError::InvalidValue {
                    field: "decorated_cache_pools".to_string(),
                    value: format!("{:?}", id),
                    reason: "decorator id cannot be empty".to_string(),
                }));
            }

            if decorator.cache_pool.trim().is_empty() {
                return Err(SwrError::Config(ConfigError::MissingRequired {
                    field: format!("decorated_cache_pools.{}.cache_pool", id),
                }));
            }

            if !self.pools.contains_key(&decorator.cache_pool) {
                return Err(SwrError::Config(ConfigError::UnknownPool {
                    decorator: id.clone(),
                    pool: decorator.cache_pool.clone(),
                }));
            }
        }

        Ok(())
    }
}
