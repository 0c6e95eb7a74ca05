//! SWR Storage - Stale-While-Revalidate Cache Decorator
//!
//! Defines the underlying cache abstraction, the stale-serving decorator
//! over it, an in-memory reference pool, and configuration wiring.

pub mod cache;
pub mod registry;

pub use cache::{
    CacheItem, CacheRead, CacheStats, Cacheable, InMemoryPool, ReadOutcome, RefreshReason,
    StaleCache, TagAwareCache, UnderlyingCache,
};
pub use registry::{build_in_memory_pools, StaleCacheRegistry};
