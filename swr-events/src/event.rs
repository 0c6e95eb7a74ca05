//! The stale cache usage event.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use swr_core::Timestamp;
use uuid::Uuid;

/// Type-erased error shared between the event and its listeners.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// A stale value was served because refreshing it failed.
#[derive(Clone)]
pub struct StaleCacheUsage {
    event_id: Uuid,
    key: String,
    error: SharedError,
    occurred_at: Timestamp,
}

impl StaleCacheUsage {
    pub fn new<E>(error: E, key: impl Into<String>) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::from_shared(Arc::new(error), key)
    }

    pub fn from_shared(error: SharedError, key: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            key: key.into(),
            error,
            occurred_at: Utc::now(),
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    /// The cache key whose stale value was served.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The error that prevented the refresh.
    pub fn error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.error.as_ref()
    }

    pub fn shared_error(&self) -> SharedError {
        Arc::clone(&self.error)
    }

    /// Try to recover the concrete error type.
    pub fn error_as<E: StdError + 'static>(&self) -> Option<&E> {
        self.error.downcast_ref::<E>()
    }

    pub fn occurred_at(&self) -> Timestamp {
        self.occurred_at
    }

    /// Serializable view of the event for log and JSON sinks.
    pub fn summary(&self) -> StaleCacheUsageRecord {
        StaleCacheUsageRecord {
            event_id: self.event_id,
            key: self.key.clone(),
            error: self.error.to_string(),
            occurred_at: self.occurred_at,
        }
    }
}

impl fmt::Debug for StaleCacheUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaleCacheUsage")
            .field("event_id", &self.event_id)
            .field("key", &self.key)
            .field("error", &self.error.to_string())
            .field("occurred_at", &self.occurred_at)
            .finish()
    }
}

/// Plain-data form of [`StaleCacheUsage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleCacheUsageRecord {
    pub event_id: Uuid,
    pub key: String,
    pub error: String,
    pub occurred_at: Timestamp,
}

impl StaleCacheUsageRecord {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Outage(&'static str);

    impl fmt::Display for Outage {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "outage: {}", self.0)
        }
    }

    impl StdError for Outage {}

    #[test]
    fn test_event_carries_key_and_error() {
        let event = StaleCacheUsage::new(Outage("db"), "user:42");
        assert_eq!(event.key(), "user:42");
        assert_eq!(event.error().to_string(), "outage: db");
        assert_eq!(event.error_as::<Outage>().map(|o| o.0), Some("db"));
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = StaleCacheUsage::new(Outage("a"), "k");
        let b = StaleCacheUsage::new(Outage("b"), "k");
        assert_ne!(a.event_id(), b.event_id());
    }

    #[test]
    fn test_summary_serializes() {
        let event = StaleCacheUsage::new(Outage("api"), "feed");
        let record = event.summary();
        assert_eq!(record.key, "feed");
        assert_eq!(record.error, "outage: api");

        let json = record.to_json().unwrap();
        let parsed: StaleCacheUsageRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_debug_shows_error_text() {
        let event = StaleCacheUsage::new(Outage("cdn"), "asset");
        let debug = format!("{:?}", event);
        assert!(debug.contains("outage: cdn"));
        assert!(debug.contains("asset"));
    }
}
