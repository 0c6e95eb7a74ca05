//! SWR Test Utilities
//!
//! Shared test infrastructure for the SWR workspace:
//! - A scripted underlying cache that records every call
//! - Error types for compute callbacks
//! - Proptest generators for metadata and decorator parameters
//! - Fixtures and assertions for stale cache scenarios

pub use swr_core::{
    CacheError, CacheMetadata, Clock, ComputeError, FixedRandom, ManualClock, RandomSource,
    SwrError, SwrResult, Timestamp,
};
pub use swr_events::{InMemoryEventBus, StaleCacheUsage};
pub use swr_storage::{
    CacheItem, CacheRead, Cacheable, ReadOutcome, RefreshReason, StaleCache, TagAwareCache,
    UnderlyingCache,
};

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use swr_core::StorageError;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// TEST ERRORS
// ============================================================================

/// Error raised by compute callbacks in tests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("source failed: {0}")]
pub struct SourceError(pub String);

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Unavailable, stale fallback allowed.
    pub fn unavailable(message: impl Into<String>) -> ComputeError<Self> {
        ComputeError::unavailable(Self::new(message))
    }

    /// Unavailable, stale fallback refused.
    pub fn unavailable_strict(message: impl Into<String>) -> ComputeError<Self> {
        ComputeError::unavailable_strict(Self::new(message))
    }

    pub fn fatal(message: impl Into<String>) -> ComputeError<Self> {
        ComputeError::fatal(Self::new(message))
    }
}

// ============================================================================
// SCRIPTED UNDERLYING CACHE
// ============================================================================

/// What the scripted cache does for one `get` call.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Return a stored value without calling the callback.
    Hit {
        value: serde_json::Value,
        metadata: CacheMetadata,
    },
    /// Run the callback on a fresh item.
    Compute,
}

/// One recorded `get` call.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheCall {
    pub key: String,
    pub beta: f64,
}

/// Underlying cache whose answers are scripted call by call.
///
/// Calls beyond the script compute. Computed items start with the
/// configured expiry and are recorded after the callback returns, whether
/// it succeeded or not.
#[derive(Debug)]
pub struct ScriptedCache {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<CacheCall>>,
    items: Mutex<Vec<CacheItem>>,
    deleted: Mutex<Vec<String>>,
    invalidated: Mutex<Vec<Vec<String>>>,
    created_at: Timestamp,
    item_expiry: Option<Timestamp>,
    compute_ctime: u64,
    delete_result: bool,
    tag_support: Option<bool>,
}

impl ScriptedCache {
    /// Computed items are created at `created_at` and never expire.
    pub fn new(created_at: Timestamp) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            items: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            invalidated: Mutex::new(Vec::new()),
            created_at,
            item_expiry: None,
            compute_ctime: 0,
            delete_result: true,
            tag_support: None,
        }
    }

    /// Queue a hit returning `value` with `metadata`.
    pub fn hit<T: Serialize>(self, value: &T, metadata: CacheMetadata) -> Self {
        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        locked(&self.script).push_back(Scripted::Hit { value, metadata });
        self
    }

    /// Queue a call that runs the callback.
    pub fn compute(self) -> Self {
        locked(&self.script).push_back(Scripted::Compute);
        self
    }

    /// Expiry preset on items handed to callbacks.
    pub fn with_item_expiry(mut self, expiry: Option<Timestamp>) -> Self {
        self.item_expiry = expiry;
        self
    }

    /// Computation time, in milliseconds, reported for computed values.
    pub fn with_compute_ctime(mut self, ctime: u64) -> Self {
        self.compute_ctime = ctime;
        self
    }

    pub fn with_delete_result(mut self, result: bool) -> Self {
        self.delete_result = result;
        self
    }

    /// Support tag invalidation, answering every call with `result`.
    pub fn tag_aware(mut self, result: bool) -> Self {
        self.tag_support = Some(result);
        self
    }

    pub fn calls(&self) -> Vec<CacheCall> {
        locked(&self.calls).clone()
    }

    pub fn betas(&self) -> Vec<f64> {
        locked(&self.calls).iter().map(|call| call.beta).collect()
    }

    /// Items as the callbacks left them, oldest first.
    pub fn items(&self) -> Vec<CacheItem> {
        locked(&self.items).clone()
    }

    pub fn last_item(&self) -> Option<CacheItem> {
        locked(&self.items).last().cloned()
    }

    pub fn deleted_keys(&self) -> Vec<String> {
        locked(&self.deleted).clone()
    }

    pub fn invalidated_tags(&self) -> Vec<Vec<String>> {
        locked(&self.invalidated).clone()
    }

    /// Scripted steps not consumed yet.
    pub fn remaining(&self) -> usize {
        locked(&self.script).len()
    }
}

impl UnderlyingCache for ScriptedCache {
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
        locked(&self.calls).push(CacheCall {
            key: key.to_string(),
            beta,
        });

        let step = locked(&self.script).pop_front().unwrap_or(Scripted::Compute);
        match step {
            Scripted::Hit { value, metadata } => {
                let value = serde_json::from_value(value).map_err(|e| {
                    StorageError::Deserialization {
                        key: key.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Ok((value, metadata))
            }
            Scripted::Compute => {
                let mut item = CacheItem::new(key, self.created_at);
                item.expires_at(self.item_expiry);
                let mut save = true;
                let result = compute(&mut item, &mut save);
                let metadata = CacheMetadata::new(item.expiry(), Some(self.compute_ctime));
                locked(&self.items).push(item);
                result.map(|value| (value, metadata)).map_err(CacheError::Compute)
            }
        }
    }

    fn delete(&self, key: &str) -> SwrResult<bool> {
        locked(&self.deleted).push(key.to_string());
        Ok(self.delete_result)
    }

    fn as_tag_aware(&self) -> Option<&dyn TagAwareCache> {
        self.tag_support.map(|_| self as &dyn TagAwareCache)
    }
}

impl TagAwareCache for ScriptedCache {
    fn invalidate_tags(&self, tags: &[&str]) -> SwrResult<bool> {
        locked(&self.invalidated).push(tags.iter().map(|tag| tag.to_string()).collect());
        Ok(self.tag_support.unwrap_or(false))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for decorator inputs.

    use super::*;
    use proptest::prelude::*;

    /// Generate a Timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_default()
        })
    }

    /// Generate a stale window of up to a week.
    pub fn arb_max_stale() -> impl Strategy<Value = Duration> {
        (0u64..=604_800).prop_map(Duration::from_secs)
    }

    /// Generate a finite, non-negative beta.
    pub fn arb_beta() -> impl Strategy<Value = f64> {
        prop_oneof![Just(0.0), Just(1.0), 0.0f64..10.0]
    }

    /// Generate a computation time in milliseconds.
    pub fn arb_ctime() -> impl Strategy<Value = u64> {
        prop_oneof![Just(0u64), 1u64..60_000]
    }

    /// Generate a non-empty cache key.
    pub fn arb_key() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_:.]{0,31}"
    }

    /// Generate metadata with an expiry and ctime.
    pub fn arb_metadata() -> impl Strategy<Value = CacheMetadata> {
        (arb_timestamp(), arb_ctime())
            .prop_map(|(expiry, ctime)| CacheMetadata::new(Some(expiry), Some(ctime)))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for stale cache scenarios.

    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    /// Fixed reference instant: 2026-01-01T00:00:00Z.
    pub fn reference_now() -> Timestamp {
        chrono::Utc
            .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default()
    }

    pub fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(reference_now()))
    }

    /// `reference_now() + secs` (negative moves into the past).
    pub fn at_offset(secs: i64) -> Timestamp {
        reference_now() + chrono::Duration::seconds(secs)
    }

    /// Decorator over `inner` with a manual clock, fixed draws and an in-memory bus.
    pub struct DecoratorFixture<C> {
        pub inner: Arc<C>,
        pub clock: Arc<ManualClock>,
        pub bus: Arc<InMemoryEventBus>,
        pub cache: StaleCache<C>,
    }

    pub fn decorate<C: UnderlyingCache>(
        inner: C,
        max_stale: Duration,
        draw: f64,
    ) -> DecoratorFixture<C> {
        let inner = Arc::new(inner);
        let clock = manual_clock();
        let bus = Arc::new(InMemoryEventBus::new());
        let cache = StaleCache::new(Arc::clone(&inner), bus.clone(), max_stale)
            .with_clock(clock.clone())
            .with_random(Arc::new(FixedRandom::new(draw)));
        DecoratorFixture {
            inner,
            clock,
            bus,
            cache,
        }
    }

    /// Callback returning `value`, optionally setting a relative lifetime.
    pub fn returning<V: Clone>(
        value: V,
        lifetime: Option<Duration>,
    ) -> impl FnMut(&mut CacheItem, &mut bool) -> Result<V, ComputeError<SourceError>> {
        move |item, _save| {
            if let Some(lifetime) = lifetime {
                item.expires_after(lifetime);
            }
            Ok(value.clone())
        }
    }

    /// Callback that always fails with `error`.
    pub fn failing<V>(
        error: ComputeError<SourceError>,
    ) -> impl FnMut(&mut CacheItem, &mut bool) -> Result<V, ComputeError<SourceError>> {
        move |_item, _save| Err(error.clone())
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for read outcomes and dispatched events.

    use super::*;

    /// Assert the read served the previous value after a failed refresh.
    #[track_caller]
    pub fn assert_stale_fallback<T: std::fmt::Debug>(read: &CacheRead<T>) {
        assert!(
            read.is_stale_fallback(),
            "Expected stale fallback, got: {:?}",
            read.outcome()
        );
    }

    /// Assert exactly one event was dispatched, for `key`, carrying `error`.
    #[track_caller]
    pub fn assert_single_event(bus: &InMemoryEventBus, key: &str, error: &SourceError) {
        let events = bus.events();
        assert_eq!(events.len(), 1, "Expected one event, got {}", events.len());
        assert_eq!(events[0].key(), key);
        assert_eq!(events[0].error_as::<SourceError>(), Some(error));
    }

    /// Assert the error is an invalid argument naming `argument`.
    #[track_caller]
    pub fn assert_invalid_argument<E: std::fmt::Debug>(result: &CacheError<E>, argument: &str) {
        match result {
            CacheError::Cache(SwrError::InvalidArgument { argument: a, .. }) => {
                assert_eq!(a, argument, "Wrong argument in InvalidArgument error");
            }
            other => panic!("Expected InvalidArgument for {}, got: {:?}", argument, other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
