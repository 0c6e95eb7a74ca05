//! SWR Events - Stale Cache Usage Notifications
//!
//! When a forced refresh fails with an error that permits stale serving, the
//! decorator returns the previous value and reports the incident as a
//! [`StaleCacheUsage`] event through an [`EventDispatcher`].
//!
//! # Dispatchers
//!
//! - [`InMemoryEventBus`]: records events and fans them out to listeners
//! - [`TracingEventDispatcher`]: reports events as `warn` log lines
//! - [`NoopDispatcher`]: discards events

mod dispatcher;
mod event;

pub use dispatcher::{EventDispatcher, InMemoryEventBus, NoopDispatcher, TracingEventDispatcher};
pub use event::{SharedError, StaleCacheUsage, StaleCacheUsageRecord};
