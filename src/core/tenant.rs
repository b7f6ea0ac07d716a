//! Tenant identity, credential keys and the execution context threaded through dispatch.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable tenant identifier. Ordering is used to pick the active tenant of a shared key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub u64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A logical owner of a queue subscription, such as a practice location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Stable identifier.
    pub id: TenantId,
    /// Display name.
    pub name: String,
    /// Inactive tenants never hold a credential key.
    pub active: bool,
}

impl Tenant {
    /// Create an active tenant.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: TenantId(id),
            name: name.into(),
            active: true,
        }
    }

    /// Return a copy of this tenant marked inactive.
    #[must_use]
    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Opaque identifier selecting a physical queue. Several tenants may share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CredentialKey(pub String);

impl CredentialKey {
    /// Create a key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity under which drain cycles run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentity {
    /// Login or principal name.
    pub name: String,
}

impl ServiceIdentity {
    /// Create a service identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Execution context for one event: who runs it and on whose behalf.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    /// Service identity resolved at the start of the drain cycle.
    pub identity: ServiceIdentity,
    /// Active tenant of the dispatching queue.
    pub tenant: Tenant,
    /// Credential key of the dispatching queue.
    pub key: CredentialKey,
}
