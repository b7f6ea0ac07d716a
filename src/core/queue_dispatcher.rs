//! Binds one queue to one event dispatcher and performs dispatch-and-acknowledge steps.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::core::{
    build_audit_event, AuditAction, AuditSink, CredentialKey, DispatchContext, DispatchError,
    Event, EventDecoder, EventDispatcher, Message, NoTransactions, Queue, ServiceIdentity, Tenant,
    Transaction, TransactionBoundary,
};

/// Dispatches messages from one queue on behalf of the queue's active tenant.
///
/// A `QueueDispatcher` holds no per-message state. The scheduler is its only caller and
/// never calls [`QueueDispatcher::dispatch`] concurrently.
pub struct QueueDispatcher {
    key: CredentialKey,
    tenant: Tenant,
    queue: Arc<dyn Queue>,
    decoder: Arc<dyn EventDecoder>,
    dispatcher: Arc<dyn EventDispatcher>,
    transactions: Arc<dyn TransactionBoundary>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl QueueDispatcher {
    /// Create a dispatcher that runs without a transaction boundary.
    pub fn new(
        key: CredentialKey,
        tenant: Tenant,
        queue: Arc<dyn Queue>,
        decoder: Arc<dyn EventDecoder>,
        dispatcher: Arc<dyn EventDispatcher>,
    ) -> Self {
        Self {
            key,
            tenant,
            queue,
            decoder,
            dispatcher,
            transactions: Arc::new(NoTransactions),
            audit: None,
        }
    }

    /// Wrap processing and acknowledgement in units of work from `transactions`.
    #[must_use]
    pub fn with_transactions(mut self, transactions: Arc<dyn TransactionBoundary>) -> Self {
        self.transactions = transactions;
        self
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Credential key of the queue.
    #[must_use]
    pub const fn key(&self) -> &CredentialKey {
        &self.key
    }

    /// The active tenant events are attributed to.
    #[must_use]
    pub const fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    /// The event dispatcher serving the active tenant.
    #[must_use]
    pub fn event_dispatcher(&self) -> Arc<dyn EventDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Process at most one message.
    ///
    /// Returns `Ok(true)` if a message was processed or discarded as malformed and
    /// `Ok(false)` if the queue was empty.
    ///
    /// The unit of work is committed before the message is removed, so a failure at
    /// any step leaves the message on the queue. A removal that fails after a commit
    /// causes the event to be applied again on redelivery.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Processing`] if the event dispatcher failed. The unit of work was
    ///   rolled back and the message left on the queue for redelivery.
    /// - [`DispatchError::Transaction`] if the unit of work could not be started or
    ///   committed. The message is left on the queue.
    /// - [`DispatchError::Transport`] if the queue could not be read or the message could
    ///   not be removed.
    pub async fn dispatch(&self, identity: &ServiceIdentity) -> Result<bool, DispatchError> {
        let Some(message) = self.queue.next().await? else {
            return Ok(false);
        };
        match self.decoder.decode(&message.content) {
            Ok(event) => {
                self.process(&message, &event, identity).await?;
                self.record(&message, AuditAction::Processed, None);
            }
            Err(e) => {
                warn!(
                    key = %self.key,
                    message_id = %message.id,
                    error = %e,
                    "discarding malformed message"
                );
                self.queue.remove(&message).await?;
                self.record(&message, AuditAction::Discarded, Some(e.to_string()));
            }
        }
        Ok(true)
    }

    async fn process(
        &self,
        message: &Message,
        event: &Event,
        identity: &ServiceIdentity,
    ) -> Result<(), DispatchError> {
        let ctx = DispatchContext {
            identity: identity.clone(),
            tenant: self.tenant.clone(),
            key: self.key.clone(),
        };
        let tx = match self.transactions.begin().await {
            Ok(tx) => tx,
            Err(e) => return Err(self.fail(message, e, "failed to begin unit of work")),
        };

        if let Err(source) = self.dispatcher.dispatch(event, &ctx).await {
            error!(
                tenant = %self.tenant,
                key = %self.key,
                message_id = %message.id,
                event_type = %event.event_type,
                error = %source,
                "failed to process event"
            );
            self.rollback(tx, message).await;
            self.record(message, AuditAction::Failed, Some(source.to_string()));
            return Err(DispatchError::Processing {
                message_id: message.id.clone(),
                source,
            });
        }

        if let Err(e) = tx.commit().await {
            return Err(self.fail(message, e, "failed to commit processed event"));
        }
        if let Err(e) = self.queue.remove(message).await {
            return Err(self.fail(message, e, "failed to remove processed message"));
        }

        self.dispatcher.acknowledged(event, &ctx);
        debug!(key = %self.key, message_id = %message.id, kind = ?event.kind, "event processed");
        Ok(())
    }

    /// Log and audit a failure that leaves `message` on the queue.
    fn fail(&self, message: &Message, e: DispatchError, what: &'static str) -> DispatchError {
        error!(
            tenant = %self.tenant,
            key = %self.key,
            message_id = %message.id,
            error = %e,
            "{what}"
        );
        self.record(message, AuditAction::Failed, Some(e.to_string()));
        e
    }

    async fn rollback(&self, tx: Box<dyn Transaction>, message: &Message) {
        if let Err(e) = tx.rollback().await {
            error!(key = %self.key, message_id = %message.id, error = %e, "rollback failed");
        }
    }

    fn record(&self, message: &Message, action: AuditAction, detail: Option<String>) {
        if let Some(audit) = &self.audit {
            audit.record(build_audit_event(
                message.id.clone(),
                self.tenant.id,
                &self.key,
                action,
                detail,
            ));
        }
    }
}

impl fmt::Debug for QueueDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueDispatcher")
            .field("key", &self.key)
            .field("tenant", &self.tenant)
            .field("queue", &self.queue.name())
            .finish_non_exhaustive()
    }
}
