//! Explicitly registered listeners notified after an event has been processed.
//!
//! Listeners are held strongly. Callers own the obligation to [`ListenerRegistry::unregister`]
//! them, or to register with a time-to-live after which they are purged.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::core::{DispatchContext, Event, EventKind};

/// Callback invoked with a processed event.
pub type Listener = Arc<dyn Fn(&Event, &DispatchContext) + Send + Sync>;

/// Handle returned by [`ListenerRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Entry {
    kind: EventKind,
    listener: Listener,
    expires_at: Option<Instant>,
}

/// Registry of listeners keyed by event kind.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Mutex<HashMap<ListenerId, Entry>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for events of `kind`. With a `ttl`, the listener is dropped
    /// once it has been registered for longer than that.
    pub fn register(&self, kind: EventKind, listener: Listener, ttl: Option<Duration>) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.lock().insert(
            id,
            Entry {
                kind,
                listener,
                expires_at,
            },
        );
        tracing::debug!(listener = %id, ?kind, "listener registered");
        id
    }

    /// Remove a listener. Returns false if it was unknown or had expired.
    pub fn unregister(&self, id: ListenerId) -> bool {
        self.entries.lock().remove(&id).is_some()
    }

    /// Number of registered, possibly expired, listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Purge expired listeners, then invoke those registered for the event's kind.
    /// Returns how many were invoked.
    pub fn notify(&self, event: &Event, context: &DispatchContext) -> usize {
        let now = Instant::now();
        let matching: Vec<Listener> = {
            let mut entries = self.entries.lock();
            entries.retain(|_, entry| entry.expires_at.is_none_or(|at| at > now));
            entries
                .values()
                .filter(|entry| entry.kind == event.kind)
                .map(|entry| Arc::clone(&entry.listener))
                .collect()
        };
        // Invoked outside the lock so listeners may unregister themselves.
        for listener in &matching {
            listener(event, context);
        }
        matching.len()
    }
}
