//! Event dispatch traits and the kind-based event router.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{
    DispatchContext, DispatchError, Event, EventKind, ListenerRegistry, ProcessingError, Tenant,
};

/// Routes a decoded event to whatever applies it to domain records.
///
/// Called inside the unit of work that also acknowledges the message. Implementations
/// must tolerate duplicate delivery: a message is redelivered whenever its unit of work
/// fails after side effects were attempted.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use tenant_dispatch::core::{DispatchContext, Event, EventDispatcher, ProcessingError};
///
/// struct LoggingDispatcher;
///
/// #[async_trait]
/// impl EventDispatcher for LoggingDispatcher {
///     async fn dispatch(&self, event: &Event, ctx: &DispatchContext) -> Result<(), ProcessingError> {
///         tracing::info!(tenant = %ctx.tenant, event_type = %event.event_type, "received");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    /// Apply `event` on behalf of `ctx.tenant`.
    ///
    /// # Errors
    ///
    /// Any error rolls back the unit of work and leaves the message on the queue.
    async fn dispatch(&self, event: &Event, ctx: &DispatchContext) -> Result<(), ProcessingError>;

    /// Called once `event` has been committed and its message removed from the queue.
    /// Not called for events that are rolled back or whose removal fails.
    fn acknowledged(&self, _event: &Event, _ctx: &DispatchContext) {}
}

/// Handles one kind of event for an [`EventRouter`].
#[async_trait]
pub trait EventProcessor: Send + Sync {
    /// Process an event already matched on kind.
    ///
    /// # Errors
    ///
    /// Propagated unchanged by the router.
    async fn process(&self, event: &Event, ctx: &DispatchContext) -> Result<(), ProcessingError>;
}

/// Creates the event dispatcher serving a tenant.
pub trait EventDispatcherFactory: Send + Sync {
    /// Build a dispatcher for `tenant`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Configuration`] when the tenant cannot be served.
    fn create(&self, tenant: &Tenant) -> Result<Arc<dyn EventDispatcher>, DispatchError>;
}

impl<F> EventDispatcherFactory for F
where
    F: Fn(&Tenant) -> Result<Arc<dyn EventDispatcher>, DispatchError> + Send + Sync,
{
    fn create(&self, tenant: &Tenant) -> Result<Arc<dyn EventDispatcher>, DispatchError> {
        self(tenant)
    }
}

/// Fans events out to processors keyed on [`EventKind`] and notifies listeners once an
/// event is acknowledged.
///
/// Events with no registered processor, including [`EventKind::Unsupported`], are
/// logged and treated as handled so they are acknowledged. Listeners can still see an
/// event twice if its message is redelivered after a failed removal.
#[derive(Default)]
pub struct EventRouter {
    processors: HashMap<EventKind, Arc<dyn EventProcessor>>,
    listeners: Arc<ListenerRegistry>,
}

impl EventRouter {
    /// Create a router with no processors and its own listener registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing listener registry.
    #[must_use]
    pub fn with_listeners(mut self, listeners: Arc<ListenerRegistry>) -> Self {
        self.listeners = listeners;
        self
    }

    /// Register the processor for `kind`, replacing any previous one.
    #[must_use]
    pub fn with_processor(mut self, kind: EventKind, processor: Arc<dyn EventProcessor>) -> Self {
        self.processors.insert(kind, processor);
        self
    }

    /// Listeners notified after an event is acknowledged.
    #[must_use]
    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }
}

#[async_trait]
impl EventDispatcher for EventRouter {
    async fn dispatch(&self, event: &Event, ctx: &DispatchContext) -> Result<(), ProcessingError> {
        match self.processors.get(&event.kind) {
            Some(processor) => processor.process(event, ctx).await?,
            None => tracing::warn!(
                tenant = %ctx.tenant,
                event_type = %event.event_type,
                "no processor for event, acknowledging"
            ),
        }
        Ok(())
    }

    fn acknowledged(&self, event: &Event, ctx: &DispatchContext) {
        self.listeners.notify(event, ctx);
    }
}
