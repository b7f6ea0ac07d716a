//! In-memory tenant directory.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::core::{
    ConnectionParams, CredentialKey, DispatchError, ServiceIdentity, Tenant, TenantDirectory,
    TenantId,
};

/// Directory backed by maps, for embedders whose configuration is already in memory.
///
/// Connection details for a key are looked up explicitly, falling back to a queue named
/// `queue_name` under the key itself as connection identifier.
pub struct InMemoryDirectory {
    queue_name: String,
    keys: RwLock<HashMap<TenantId, CredentialKey>>,
    connections: RwLock<HashMap<CredentialKey, ConnectionParams>>,
    identity: RwLock<Option<ServiceIdentity>>,
}

impl InMemoryDirectory {
    /// Create an empty directory whose default queue name is `queue_name`.
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            keys: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            identity: RwLock::new(None),
        }
    }

    /// Set or clear a tenant's credential key.
    pub fn set_key(&self, tenant: TenantId, key: Option<CredentialKey>) {
        let mut keys = self.keys.write();
        match key {
            Some(key) => keys.insert(tenant, key),
            None => keys.remove(&tenant),
        };
    }

    /// Override the connection details for a key.
    pub fn set_connection(&self, key: CredentialKey, params: ConnectionParams) {
        self.connections.write().insert(key, params);
    }

    /// Set or clear the service identity.
    pub fn set_identity(&self, identity: Option<ServiceIdentity>) {
        *self.identity.write() = identity;
    }
}

impl TenantDirectory for InMemoryDirectory {
    fn credential_key(&self, tenant: &Tenant) -> Option<CredentialKey> {
        self.keys.read().get(&tenant.id).cloned()
    }

    fn connection_params(
        &self,
        key: &CredentialKey,
        _tenant: &Tenant,
    ) -> Result<ConnectionParams, DispatchError> {
        if key.0.is_empty() {
            return Err(DispatchError::Configuration("empty credential key".into()));
        }
        Ok(self
            .connections
            .read()
            .get(key)
            .cloned()
            .unwrap_or_else(|| ConnectionParams::new(key.0.clone(), self.queue_name.clone())))
    }

    fn service_identity(&self) -> Option<ServiceIdentity> {
        self.identity.read().clone()
    }
}
