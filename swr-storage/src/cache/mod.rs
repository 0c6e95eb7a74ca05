//! Stale-while-revalidate cache layer.
//!
//! An [`UnderlyingCache`] owns entries, expiry, per-key locking and
//! probabilistic early recomputation. [`StaleCache`] decorates it so that
//! values survive `max_stale` past their logical expiry and can be served
//! when a refresh fails with an error that permits it.
//!
//! # Design Philosophy
//!
//! Serving stale data is never silent. Reads return [`CacheRead<T>`], whose
//! [`ReadOutcome`] says whether the value was a hit, freshly computed,
//! refreshed, or a stale fallback, and every fallback dispatches a
//! `StaleCacheUsage` event.
//!
//! # Example
//!
//! ```ignore
//! let pool = Arc::new(InMemoryPool::new().with_default_lifetime(Duration::from_secs(600)));
//! let cache = StaleCache::new(pool, Arc::new(TracingEventDispatcher), Duration::from_secs(1800))
//!     .with_default_lifetime(Duration::from_secs(600));
//!
//! let read = cache.get("profile:42", |item, _save| {
//!     item.tag("profiles");
//!     load_profile(42).map_err(ComputeError::unavailable)
//! }, 1.0)?;
//! ```

pub mod freshness;
pub mod item;
pub mod memory;
pub mod stale;
pub mod traits;

pub use freshness::{CacheRead, ReadOutcome, RefreshReason};
pub use item::CacheItem;
pub use memory::InMemoryPool;
pub use stale::StaleCache;
pub use traits::{CacheStats, Cacheable, TagAwareCache, UnderlyingCache};
