//! Event dispatch.

use crate::event::StaleCacheUsage;
use std::fmt;
use std::sync::RwLock;

/// Receives stale cache usage events.
///
/// Dispatch is fire-and-forget: implementations must not fail the cache read
/// that produced the event.
pub trait EventDispatcher: Send + Sync {
    fn dispatch(&self, event: StaleCacheUsage);
}

type Listener = Box<dyn Fn(&StaleCacheUsage) + Send + Sync>;

/// Records every event and forwards it to subscribed listeners.
#[derive(Default)]
pub struct InMemoryEventBus {
    events: RwLock<Vec<StaleCacheUsage>>,
    listeners: RwLock<Vec<Listener>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener invoked synchronously on every dispatch.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&StaleCacheUsage) + Send + Sync + 'static,
    {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(Box::new(listener)),
            Err(poisoned) => poisoned.into_inner().push(Box::new(listener)),
        }
    }

    /// Snapshot of the recorded events, oldest first.
    pub fn events(&self) -> Vec<StaleCacheUsage> {
        match self.events.read() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Recorded events for one cache key.
    pub fn events_for(&self, key: &str) -> Vec<StaleCacheUsage> {
        self.events()
            .into_iter()
            .filter(|event| event.key() == key)
            .collect()
    }

    pub fn len(&self) -> usize {
        match self.events.read() {
            Ok(events) => events.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        match self.events.write() {
            Ok(mut events) => events.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl EventDispatcher for InMemoryEventBus {
    fn dispatch(&self, event: StaleCacheUsage) {
        {
            let listeners = match self.listeners.read() {
                Ok(listeners) => listeners,
                Err(poisoned) => poisoned.into_inner(),
            };
            for listener in listeners.iter() {
                listener(&event);
            }
        }

        match self.events.write() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

impl fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("events", &self.len())
            .finish_non_exhaustive()
    }
}

/// Reports events as `warn` log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventDispatcher;

impl EventDispatcher for TracingEventDispatcher {
    fn dispatch(&self, event: StaleCacheUsage) {
        tracing::warn!(
            event_id = %event.event_id(),
            cache_key = %event.key(),
            error = %event.error(),
            "Serving stale cache value after failed refresh"
        );
    }
}

/// Discards events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDispatcher;

impl EventDispatcher for NoopDispatcher {
    fn dispatch(&self, _event: StaleCacheUsage) {}
}
