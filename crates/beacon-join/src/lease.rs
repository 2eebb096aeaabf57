use beacon_core::{LeaseDuration, LeaseId, RegistryHandle};
use std::sync::atomic::{AtomicU64, Ordering};

/// A registry-issued lease as tracked locally.
///
/// Only the expiration moves, and only when the lease manager applies a
/// successful renewal.
#[derive(Debug)]
pub struct Lease {
    id: LeaseId,
    registry: RegistryHandle,
    expiration: AtomicU64,
    requested: LeaseDuration,
}

impl Lease {
    pub fn new(id: LeaseId, registry: RegistryHandle, expiration: u64, requested: LeaseDuration) -> Self {
        Self {
            id,
            registry,
            expiration: AtomicU64::new(expiration),
            requested,
        }
    }

    pub fn id(&self) -> LeaseId {
        self.id
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Expiration in clock milliseconds.
    pub fn expiration(&self) -> u64 {
        self.expiration.load(Ordering::Acquire)
    }

    pub fn requested(&self) -> LeaseDuration {
        self.requested
    }

    pub(crate) fn extend(&self, expiration: u64) {
        self.expiration.store(expiration, Ordering::Release);
    }
}
