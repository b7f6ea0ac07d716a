//! Wire a tenant registry and scheduled dispatcher from collaborator factories.

use std::sync::Arc;

use tracing::warn;

use crate::config::DispatchConfig;
use crate::core::{
    AppResult, AuditSink, EventDecoder, EventDispatcherFactory, QueueDispatcherFactory,
    QueueDispatchers, QueueFactory, ScheduledDispatcher, Tenant, TenantDirectory,
    TransactionBoundary,
};

/// Builds a [`ScheduledDispatcher`] over a [`QueueDispatchers`] registry.
pub struct SchedulerBuilder {
    config: DispatchConfig,
    directory: Arc<dyn TenantDirectory>,
    queues: Arc<dyn QueueFactory>,
    dispatchers: Arc<dyn EventDispatcherFactory>,
    decoder: Option<Arc<dyn EventDecoder>>,
    transactions: Option<Arc<dyn TransactionBoundary>>,
    audit: Option<Arc<dyn AuditSink>>,
    tenants: Vec<Tenant>,
}

impl SchedulerBuilder {
    /// Start from the default configuration.
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        queues: Arc<dyn QueueFactory>,
        dispatchers: Arc<dyn EventDispatcherFactory>,
    ) -> Self {
        Self {
            config: DispatchConfig::default(),
            directory,
            queues,
            dispatchers,
            decoder: None,
            transactions: None,
            audit: None,
            tenants: Vec::new(),
        }
    }

    /// Use `config` instead of the defaults.
    #[must_use]
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Decode message content with `decoder` instead of the JSON envelope decoder.
    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn EventDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Run dispatch inside units of work from `transactions`.
    #[must_use]
    pub fn with_transactions(mut self, transactions: Arc<dyn TransactionBoundary>) -> Self {
        self.transactions = Some(transactions);
        self
    }

    /// Record message outcomes to `audit`.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Tenants registered before the first poll.
    #[must_use]
    pub fn with_tenants(mut self, tenants: impl IntoIterator<Item = Tenant>) -> Self {
        self.tenants.extend(tenants);
        self
    }

    /// Validate configuration, register the initial tenants and start polling if any
    /// of them has a queue. Tenants whose dispatcher cannot be created are logged and
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid configuration or if the worker cannot start.
    pub fn build(self) -> AppResult<ScheduledDispatcher> {
        self.config.validate()?;

        let mut factory = QueueDispatcherFactory::new(
            Arc::clone(&self.directory),
            self.queues,
            self.dispatchers,
        );
        if let Some(decoder) = self.decoder {
            factory = factory.with_decoder(decoder);
        }
        if let Some(transactions) = self.transactions {
            factory = factory.with_transactions(transactions);
        }
        if let Some(audit) = self.audit {
            factory = factory.with_audit(audit);
        }

        let registry = Arc::new(QueueDispatchers::new(self.directory, Arc::new(factory)));
        for tenant in &self.tenants {
            if let Err(e) = registry.add(tenant) {
                warn!(tenant = %tenant, error = %e, "tenant not registered");
            }
        }

        let scheduler = ScheduledDispatcher::new(Arc::clone(&registry), &self.config)?;
        if !registry.is_empty() {
            scheduler.poll();
        }
        Ok(scheduler)
    }
}
