//! Freshness decisions for cache reads.
//!
//! Two independent predicates decide whether a cached value should be
//! recomputed:
//!
//! - **stale**: the logical expiry (`expiry - max_stale`) lies in the past;
//! - **early expiration**: the XFetch test
//!   `expiry - max_stale <= now - ctime/1000 * beta * ln(U)` with `U` drawn
//!   uniformly from (0, 1]. The term `-ln(U)` is exponentially distributed,
//!   so expensive values (large `ctime`) and aggressive callers (large
//!   `beta`) are refreshed further ahead of their deadline, which spreads
//!   recomputations out instead of having every reader miss at once.
//!
//! Reads return [`CacheRead<T>`], which carries the timing metadata and how
//! the value was obtained.

use std::time::Duration;

use swr_core::{sub_duration, timestamp_secs, CacheMetadata, RandomSource, SwrError, SwrResult, Timestamp};

/// Reject betas the early-expiration formula cannot use.
pub fn validate_beta(beta: f64) -> SwrResult<()> {
    if beta.is_nan() || beta < 0.0 {
        return Err(SwrError::invalid_argument(
            "beta",
            format!("must be a non-negative number, got {}", beta),
        ));
    }
    Ok(())
}

pub fn validate_key(key: &str) -> SwrResult<()> {
    if key.is_empty() {
        return Err(SwrError::invalid_argument("key", "cache key cannot be empty"));
    }
    Ok(())
}

/// Expiry the value was computed for, before the stale window was added.
pub fn logical_expiry(metadata: &CacheMetadata, max_stale: Duration) -> Option<Timestamp> {
    metadata.expiry.map(|expiry| sub_duration(expiry, max_stale))
}

/// True iff an expiry is present and `expiry - max_stale < now`.
pub fn is_stale(metadata: &CacheMetadata, max_stale: Duration, now: Timestamp) -> bool {
    logical_expiry(metadata, max_stale).is_some_and(|deadline| deadline < now)
}

/// Seconds by which the deadline is pulled forward: `-ctime/1000 * beta * ln(draw)`.
///
/// Never negative. `inf * 0` (zero cost, or a draw of exactly 1 with an
/// infinite beta) counts as no jitter.
pub fn early_expiration_jitter(ctime_ms: u64, beta: f64, draw: f64) -> f64 {
    let jitter = (ctime_ms as f64 / 1000.0) * beta * -draw.ln();
    if jitter.is_nan() {
        0.0
    } else {
        jitter.max(0.0)
    }
}

/// XFetch test against an arbitrary deadline.
///
/// A beta of zero (or less) disables early expiration entirely.
pub fn is_due(deadline: Timestamp, ctime_ms: u64, beta: f64, now: Timestamp, draw: f64) -> bool {
    if beta.is_nan() || beta <= 0.0 {
        return false;
    }
    timestamp_secs(deadline) <= timestamp_secs(now) + early_expiration_jitter(ctime_ms, beta, draw)
}

/// Whether a value that is not yet stale should be recomputed ahead of time.
///
/// Requires both `expiry` and `ctime`. The random source is only consulted
/// when both are present.
pub fn should_expire_early(
    metadata: &CacheMetadata,
    max_stale: Duration,
    beta: f64,
    now: Timestamp,
    random: &dyn RandomSource,
) -> bool {
    match (logical_expiry(metadata, max_stale), metadata.ctime) {
        (Some(deadline), Some(ctime)) if beta > 0.0 => {
            is_due(deadline, ctime, beta, now, random.unit_interval())
        }
        _ => false,
    }
}

/// Why a cached value was recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshReason {
    /// The value was past its logical expiry.
    Stale,
    /// The value was elected for probabilistic early expiration.
    EarlyExpiration,
}

/// How the value of a read was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadOutcome {
    /// Served from the cache without recomputation.
    Hit,
    /// Computed because the cache held no valid entry.
    Computed,
    /// Recomputed on top of an existing entry.
    Refreshed(RefreshReason),
    /// Recomputation failed with a recoverable error; the previous value
    /// was served instead.
    StaleFallback(RefreshReason),
}

/// Result of a cache read, carrying timing metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
    value: T,
    metadata: CacheMetadata,
    outcome: ReadOutcome,
}

impl<T> CacheRead<T> {
    pub fn new(value: T, metadata: CacheMetadata, outcome: ReadOutcome) -> Self {
        Self {
            value,
            metadata,
            outcome,
        }
    }

    pub fn hit(value: T, metadata: CacheMetadata) -> Self {
        Self::new(value, metadata, ReadOutcome::Hit)
    }

    pub fn computed(value: T, metadata: CacheMetadata) -> Self {
        Self::new(value, metadata, ReadOutcome::Computed)
    }

    pub fn refreshed(value: T, metadata: CacheMetadata, reason: RefreshReason) -> Self {
        Self::new(value, metadata, ReadOutcome::Refreshed(reason))
    }

    pub fn stale_fallback(value: T, metadata: CacheMetadata, reason: RefreshReason) -> Self {
        Self::new(value, metadata, ReadOutcome::StaleFallback(reason))
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Split into the value and its metadata.
    pub fn into_parts(self) -> (T, CacheMetadata) {
        (self.value, self.metadata)
    }

    /// Get a reference to the underlying value.
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn metadata(&self) -> &CacheMetadata {
        &self.metadata
    }

    pub fn outcome(&self) -> ReadOutcome {
        self.outcome
    }

    /// True if the compute callback produced this value during the read.
    pub fn was_computed(&self) -> bool {
        matches!(
            self.outcome,
            ReadOutcome::Computed | ReadOutcome::Refreshed(_)
        )
    }

    /// True if the value is a deliberately served stale value.
    pub fn is_stale_fallback(&self) -> bool {
        matches!(self.outcome, ReadOutcome::StaleFallback(_))
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            metadata: self.metadata,
            outcome: self.outcome,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
