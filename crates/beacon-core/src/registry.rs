use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

use crate::descriptor::ServiceDescriptor;
use crate::errors::{RemoteError, RenewalError};
use crate::lease::{LeaseDuration, LeaseId};

/// Locator of a lookup registry, e.g. `lookup://host:4160`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistryId(String);

impl RegistryId {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a registry hands back for an accepted registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub registration_id: Uuid,
    pub lease_id: LeaseId,
    /// Lease expiration, in clock milliseconds.
    pub expiration: u64,
}

/// Remote operations of a discovered lookup registry.
#[async_trait]
pub trait LookupRegistry: Send + Sync {
    async fn register(
        &self,
        descriptor: &ServiceDescriptor,
        requested: LeaseDuration,
    ) -> Result<Registration, RemoteError>;

    /// Extends a lease and returns its new expiration.
    async fn renew(&self, lease: LeaseId, requested: LeaseDuration) -> Result<u64, RenewalError>;
}

/// Discovered registry endpoint. Equality and hashing use the id only.
#[derive(Clone)]
pub struct RegistryHandle {
    id: RegistryId,
    remote: Arc<dyn LookupRegistry>,
}

impl RegistryHandle {
    pub fn new(id: RegistryId, remote: Arc<dyn LookupRegistry>) -> Self {
        Self { id, remote }
    }

    pub fn id(&self) -> &RegistryId {
        &self.id
    }

    pub fn remote(&self) -> &dyn LookupRegistry {
        self.remote.as_ref()
    }
}

impl fmt::Debug for RegistryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryHandle").field("id", &self.id).finish_non_exhaustive()
    }
}

impl PartialEq for RegistryHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RegistryHandle {}

impl Hash for RegistryHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
