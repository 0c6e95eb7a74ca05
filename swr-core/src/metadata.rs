//! Timing metadata attached to cached values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Timing metadata of a cache entry.
///
/// `expiry` is the physical expiry stored by the underlying cache (`None`
/// means the entry never expires). `ctime` is how long the last computation
/// of the value took, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub expiry: Option<Timestamp>,
    pub ctime: Option<u64>,
}

impl CacheMetadata {
    pub fn new(expiry: Option<Timestamp>, ctime: Option<u64>) -> Self {
        Self { expiry, ctime }
    }

    /// Metadata for an entry that never expires.
    pub fn unexpiring() -> Self {
        Self::default()
    }

    pub fn with_expiry(mut self, expiry: Timestamp) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn with_ctime(mut self, ctime_ms: u64) -> Self {
        self.ctime = Some(ctime_ms);
        self
    }

    /// Returns true if the entry has no expiry.
    pub fn is_unexpiring(&self) -> bool {
        self.expiry.is_none()
    }
}

/// Seconds since the Unix epoch with microsecond precision.
pub fn timestamp_secs(ts: Timestamp) -> f64 {
    ts.timestamp_micros() as f64 / 1_000_000.0
}

/// Add a std duration to a timestamp, saturating at the representable maximum.
pub fn add_duration(ts: Timestamp, duration: Duration) -> Timestamp {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| ts.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Subtract a std duration from a timestamp, saturating at the representable minimum.
pub fn sub_duration(ts: Timestamp, duration: Duration) -> Timestamp {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| ts.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_metadata_builders() {
        let expiry = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let meta = CacheMetadata::unexpiring().with_expiry(expiry).with_ctime(120);
        assert_eq!(meta.expiry, Some(expiry));
        assert_eq!(meta.ctime, Some(120));
        assert!(!meta.is_unexpiring());
        assert!(CacheMetadata::default().is_unexpiring());
    }

    #[test]
    fn test_timestamp_secs_keeps_micros() {
        let ts = Utc.timestamp_opt(1_700_000_000, 250_000_000).unwrap();
        assert!((timestamp_secs(ts) - 1_700_000_000.25).abs() < 1e-6);
    }

    #[test]
    fn test_duration_arithmetic() {
        let ts = Utc.timestamp_opt(1_000, 0).unwrap();
        assert_eq!(add_duration(ts, Duration::from_secs(30)).timestamp(), 1_030);
        assert_eq!(sub_duration(ts, Duration::from_secs(30)).timestamp(), 970);
    }

    #[test]
    fn test_duration_arithmetic_saturates() {
        let ts = Utc.timestamp_opt(1_000, 0).unwrap();
        assert_eq!(add_duration(ts, Duration::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(sub_duration(ts, Duration::MAX), DateTime::<Utc>::MIN_UTC);
    }
}
