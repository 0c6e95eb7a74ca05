//! Item handle passed to compute callbacks.

use std::collections::BTreeSet;
use std::time::Duration;

use swr_core::{add_duration, Timestamp};

/// The underlying cache's view of one entry while it is being computed.
///
/// Callbacks use it to set the entry's expiry and tags. The stale decorator
/// uses [`CacheItem::extend_expiry`] to keep entries physically stored past
/// their logical expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheItem {
    key: String,
    created_at: Timestamp,
    expiry: Option<Timestamp>,
    tags: BTreeSet<String>,
}

impl CacheItem {
    /// A fresh item that never expires. `created_at` anchors
    /// [`CacheItem::expires_after`].
    pub fn new(key: impl Into<String>, created_at: Timestamp) -> Self {
        Self {
            key: key.into(),
            created_at,
            expiry: None,
            tags: BTreeSet::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Absolute expiry, `None` if the item never expires.
    pub fn expiry(&self) -> Option<Timestamp> {
        self.expiry
    }

    pub fn expires_at(&mut self, expiry: Option<Timestamp>) -> &mut Self {
        self.expiry = expiry;
        self
    }

    /// Expire `lifetime` after the item was created.
    pub fn expires_after(&mut self, lifetime: Duration) -> &mut Self {
        self.expiry = Some(add_duration(self.created_at, lifetime));
        self
    }

    /// Push an existing expiry further out.
    ///
    /// Returns false, leaving the item unexpiring, when no expiry is set.
    pub fn extend_expiry(&mut self, by: Duration) -> bool {
        match self.expiry {
            Some(expiry) => {
                self.expiry = Some(add_duration(expiry, by));
                true
            }
            None => false,
        }
    }

    pub fn tag(&mut self, tag: impl Into<String>) -> &mut Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_new_item_never_expires() {
        let item = CacheItem::new("k", at(100));
        assert_eq!(item.key(), "k");
        assert_eq!(item.created_at(), at(100));
        assert!(item.expiry().is_none());
        assert!(item.tags().is_empty());
    }

    #[test]
    fn test_expires_after_is_relative_to_creation() {
        let mut item = CacheItem::new("k", at(100));
        item.expires_after(Duration::from_secs(60));
        assert_eq!(item.expiry(), Some(at(160)));
    }

    #[test]
    fn test_extend_expiry() {
        let mut item = CacheItem::new("k", at(100));
        assert!(!item.extend_expiry(Duration::from_secs(10)));
        assert!(item.expiry().is_none());

        item.expires_at(Some(at(200)));
        assert!(item.extend_expiry(Duration::from_secs(1800)));
        assert_eq!(item.expiry(), Some(at(2000)));
    }

    #[test]
    fn test_tags() {
        let mut item = CacheItem::new("k", at(0));
        item.tag("users").tag("profiles").tag("users");
        assert_eq!(item.tags().len(), 2);
        assert!(item.has_tag("users"));
        assert!(!item.has_tag("orders"));
    }
}
