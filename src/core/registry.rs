//! Tenant registry multiplexing tenants that share a credential key onto one
//! [`QueueDispatcher`].
//!
//! Exactly one dispatcher exists per live credential key. When several tenants share a
//! key only the *active* tenant's dispatcher is polled, so events are attributed to that
//! tenant. The first tenant to claim a key becomes active; when the active tenant is
//! removed, the remaining tenant with the lowest id is promoted. Which tenant is active
//! therefore depends on the order tenants were added and is not stable across restarts.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::core::{
    AuditSink, ConnectionParams, CredentialKey, DispatchError, EventDecoder, EventDispatcher,
    EventDispatcherFactory, JsonEventDecoder, NoTransactions, QueueDispatcher, QueueFactory,
    ServiceIdentity, Tenant, TenantId, TransactionBoundary,
};

/// External directory supplying tenant configuration.
pub trait TenantDirectory: Send + Sync {
    /// Current credential key of `tenant`, or `None` if unconfigured.
    fn credential_key(&self, tenant: &Tenant) -> Option<CredentialKey>;

    /// Connection details of the queue selected by `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Configuration`] if the details cannot be resolved.
    fn connection_params(
        &self,
        key: &CredentialKey,
        tenant: &Tenant,
    ) -> Result<ConnectionParams, DispatchError>;

    /// Identity drain cycles run as, or `None` if not configured.
    fn service_identity(&self) -> Option<ServiceIdentity>;
}

/// Builds the dispatcher for a key and its active tenant.
pub trait DispatcherFactory: Send + Sync {
    /// Create a dispatcher polling the queue for `key` on behalf of `tenant`.
    ///
    /// # Errors
    ///
    /// Any error leaves the key without a dispatcher.
    fn create(&self, key: &CredentialKey, tenant: &Tenant) -> Result<QueueDispatcher, DispatchError>;
}

/// Default [`DispatcherFactory`] resolving connection details through a [`TenantDirectory`].
pub struct QueueDispatcherFactory {
    directory: Arc<dyn TenantDirectory>,
    queues: Arc<dyn QueueFactory>,
    dispatchers: Arc<dyn EventDispatcherFactory>,
    decoder: Arc<dyn EventDecoder>,
    transactions: Arc<dyn TransactionBoundary>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl QueueDispatcherFactory {
    /// Create a factory decoding JSON envelopes without a transaction boundary.
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        queues: Arc<dyn QueueFactory>,
        dispatchers: Arc<dyn EventDispatcherFactory>,
    ) -> Self {
        Self {
            directory,
            queues,
            dispatchers,
            decoder: Arc::new(JsonEventDecoder),
            transactions: Arc::new(NoTransactions),
            audit: None,
        }
    }

    /// Use a different decoder.
    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn EventDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Wrap dispatch in units of work from `transactions`.
    #[must_use]
    pub fn with_transactions(mut self, transactions: Arc<dyn TransactionBoundary>) -> Self {
        self.transactions = transactions;
        self
    }

    /// Attach an audit sink to every dispatcher created.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }
}

impl DispatcherFactory for QueueDispatcherFactory {
    fn create(&self, key: &CredentialKey, tenant: &Tenant) -> Result<QueueDispatcher, DispatchError> {
        let params = self.directory.connection_params(key, tenant)?;
        let queue = self.queues.create(&params)?;
        let dispatcher = self.dispatchers.create(tenant)?;
        let mut result = QueueDispatcher::new(
            key.clone(),
            tenant.clone(),
            queue,
            Arc::clone(&self.decoder),
            dispatcher,
        )
        .with_transactions(Arc::clone(&self.transactions));
        if let Some(audit) = &self.audit {
            result = result.with_audit(Arc::clone(audit));
        }
        Ok(result)
    }
}

#[derive(Default)]
struct RegistryState {
    tenants_by_key: HashMap<CredentialKey, BTreeMap<TenantId, Tenant>>,
    key_by_tenant: HashMap<TenantId, CredentialKey>,
    dispatcher_by_key: HashMap<CredentialKey, Arc<QueueDispatcher>>,
}

impl RegistryState {
    fn add_key(
        &mut self,
        factory: &dyn DispatcherFactory,
        tenant: &Tenant,
        key: CredentialKey,
    ) -> Result<Option<Arc<QueueDispatcher>>, DispatchError> {
        if let Some(tenants) = self.tenants_by_key.get_mut(&key) {
            warn!(
                tenant = %tenant,
                key = %key,
                "credential key is shared by multiple tenants; events are attributed to the active tenant"
            );
            tenants.insert(tenant.id, tenant.clone());
            self.key_by_tenant.insert(tenant.id, key);
            return Ok(None);
        }
        let dispatcher = Arc::new(factory.create(&key, tenant)?);
        info!(tenant = %tenant, key = %key, "queue dispatcher created");
        self.tenants_by_key
            .insert(key.clone(), BTreeMap::from([(tenant.id, tenant.clone())]));
        self.key_by_tenant.insert(tenant.id, key.clone());
        self.dispatcher_by_key.insert(key, Arc::clone(&dispatcher));
        Ok(Some(dispatcher))
    }

    /// Store updated tenant details under an unchanged key. A changed active tenant
    /// gets a rebuilt dispatcher; if that fails the old one keeps running.
    fn refresh(&mut self, factory: &dyn DispatcherFactory, tenant: &Tenant, key: &CredentialKey) {
        if let Some(tenants) = self.tenants_by_key.get_mut(key) {
            tenants.insert(tenant.id, tenant.clone());
        }
        let Some(active) = self.dispatcher_by_key.get(key) else {
            return;
        };
        if active.tenant().id != tenant.id || active.tenant() == tenant {
            return;
        }
        match factory.create(key, tenant) {
            Ok(dispatcher) => {
                info!(tenant = %tenant, key = %key, "active tenant updated");
                self.dispatcher_by_key.insert(key.clone(), Arc::new(dispatcher));
            }
            Err(e) => {
                warn!(tenant = %tenant, key = %key, error = %e, "keeping previous dispatcher");
            }
        }
    }

    fn remove_key(
        &mut self,
        factory: &dyn DispatcherFactory,
        tenant: TenantId,
        key: &CredentialKey,
    ) -> Option<Arc<QueueDispatcher>> {
        self.key_by_tenant.remove(&tenant);
        let tenants = self.tenants_by_key.get_mut(key)?;
        tenants.remove(&tenant);
        let Some(successor) = tenants.values().next().cloned() else {
            self.tenants_by_key.remove(key);
            self.dispatcher_by_key.remove(key);
            info!(key = %key, "queue dispatcher removed");
            return None;
        };
        let active = self.dispatcher_by_key.get(key).map(|d| d.tenant().id);
        if active != Some(tenant) {
            return None;
        }
        match factory.create(key, &successor) {
            Ok(dispatcher) => {
                info!(key = %key, tenant = %successor, "promoted tenant to active");
                let dispatcher = Arc::new(dispatcher);
                self.dispatcher_by_key.insert(key.clone(), Arc::clone(&dispatcher));
                Some(dispatcher)
            }
            Err(e) => {
                // Forget the key entirely so re-adding any of its tenants retries.
                error!(key = %key, tenant = %successor, error = %e, "failed to promote tenant");
                if let Some(orphans) = self.tenants_by_key.remove(key) {
                    for id in orphans.keys() {
                        self.key_by_tenant.remove(id);
                    }
                }
                self.dispatcher_by_key.remove(key);
                None
            }
        }
    }
}

/// Registry of live queue dispatchers, one per credential key.
///
/// All mutation is serialised by one lock, which snapshotting also takes, so readers
/// never observe a half-applied update.
pub struct QueueDispatchers {
    directory: Arc<dyn TenantDirectory>,
    factory: Arc<dyn DispatcherFactory>,
    state: Mutex<RegistryState>,
}

impl QueueDispatchers {
    /// Create an empty registry.
    pub fn new(directory: Arc<dyn TenantDirectory>, factory: Arc<dyn DispatcherFactory>) -> Self {
        Self {
            directory,
            factory,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Directory used to resolve keys and the service identity.
    #[must_use]
    pub fn directory(&self) -> &Arc<dyn TenantDirectory> {
        &self.directory
    }

    /// Register a new or updated tenant.
    ///
    /// Returns the dispatcher created when the tenant is the first to claim its key, so
    /// the caller can poll it straight away. Returns `None` when the key is unchanged,
    /// when the tenant joined a key that already has a dispatcher, or when it lost its
    /// key. An active tenant whose details changed under the same key has its
    /// dispatcher rebuilt so events carry the new details.
    ///
    /// # Errors
    ///
    /// Propagates dispatcher construction failures. The tenant is then left unregistered
    /// and a later `add` retries.
    pub fn add(&self, tenant: &Tenant) -> Result<Option<Arc<QueueDispatcher>>, DispatchError> {
        let key = if tenant.active {
            self.directory.credential_key(tenant)
        } else {
            None
        };
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let current = state.key_by_tenant.get(&tenant.id).cloned();
        if current == key {
            if let Some(key) = key {
                state.refresh(self.factory.as_ref(), tenant, &key);
            }
            debug!(tenant = %tenant, "tenant key unchanged");
            return Ok(None);
        }
        if let Some(old) = current {
            state.remove_key(self.factory.as_ref(), tenant.id, &old);
        }
        match key {
            Some(key) => state.add_key(self.factory.as_ref(), tenant, key),
            None => Ok(None),
        }
    }

    /// Unregister a tenant.
    ///
    /// If it was the active tenant of a shared key, a replacement dispatcher bound to the
    /// lowest-id remaining tenant is installed and returned. Dispatcher instances are
    /// therefore not stable across removals.
    pub fn remove(&self, tenant: &Tenant) -> Option<Arc<QueueDispatcher>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let key = state.key_by_tenant.get(&tenant.id).cloned()?;
        state.remove_key(self.factory.as_ref(), tenant.id, &key)
    }

    /// Snapshot of all live dispatchers.
    #[must_use]
    pub fn get_dispatchers(&self) -> Vec<Arc<QueueDispatcher>> {
        self.state.lock().dispatcher_by_key.values().cloned().collect()
    }

    /// The event dispatcher currently serving `tenant`, which for a non-active tenant of
    /// a shared key is the active tenant's.
    #[must_use]
    pub fn get_event_dispatcher(&self, tenant: &Tenant) -> Option<Arc<dyn EventDispatcher>> {
        let state = self.state.lock();
        let key = state.key_by_tenant.get(&tenant.id)?;
        state
            .dispatcher_by_key
            .get(key)
            .map(|d| d.event_dispatcher())
    }

    /// The dispatcher for `key`, if live.
    #[must_use]
    pub fn dispatcher_for(&self, key: &CredentialKey) -> Option<Arc<QueueDispatcher>> {
        self.state.lock().dispatcher_by_key.get(key).cloned()
    }

    /// The key `tenant` is registered under.
    #[must_use]
    pub fn key_for(&self, tenant: TenantId) -> Option<CredentialKey> {
        self.state.lock().key_by_tenant.get(&tenant).cloned()
    }

    /// Tenants registered under `key`, lowest id first.
    #[must_use]
    pub fn tenants_for(&self, key: &CredentialKey) -> Vec<Tenant> {
        self.state
            .lock()
            .tenants_by_key
            .get(key)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of live dispatchers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().dispatcher_by_key.len()
    }

    /// True if there are no live dispatchers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().dispatcher_by_key.is_empty()
    }
}
