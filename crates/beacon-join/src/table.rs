use beacon_core::{LeaseId, RegistryHandle, RegistryId, ServiceDescriptor, ServiceId};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::lease::Lease;

/// A live registration of one descriptor with one registry.
#[derive(Debug, Clone)]
pub struct RegistrationRecord {
    pub descriptor: Arc<ServiceDescriptor>,
    pub registry: RegistryHandle,
    pub registration_id: Uuid,
    pub lease: Arc<Lease>,
}

/// Serializable view of a record, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSnapshot {
    pub service_id: ServiceId,
    pub registry: RegistryId,
    pub registration_id: Uuid,
    pub lease_id: LeaseId,
    pub expiration: u64,
}

impl From<&RegistrationRecord> for RecordSnapshot {
    fn from(record: &RegistrationRecord) -> Self {
        Self {
            service_id: record.descriptor.id(),
            registry: record.registry.id().clone(),
            registration_id: record.registration_id,
            lease_id: record.lease.id(),
            expiration: record.lease.expiration(),
        }
    }
}

type Key = (ServiceId, RegistryId);

#[derive(Debug)]
enum Slot {
    Registering,
    Registered(RegistrationRecord),
}

/// Result of trying to start a registration for a (service, registry) pair.
pub enum Claim<'a> {
    Claimed(ClaimGuard<'a>),
    InFlight,
    Registered,
}

/// Every (service, registry) pair the process is registering or registered with.
///
/// A pair holds at most one slot. Registration claims the slot before any
/// remote call, so overlapping discovery batches never produce two leases.
#[derive(Debug, Default)]
pub struct RegistrationTable {
    slots: RwLock<HashMap<Key, Slot>>,
}

impl RegistrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, service: ServiceId, registry: &RegistryId) -> Claim<'_> {
        let key = (service, registry.clone());
        let mut slots = self.slots.write();
        match slots.get(&key).map(|slot| matches!(slot, Slot::Registering)) {
            Some(true) => Claim::InFlight,
            Some(false) => Claim::Registered,
            None => {
                slots.insert(key.clone(), Slot::Registering);
                Claim::Claimed(ClaimGuard {
                    table: self,
                    key: Some(key),
                })
            }
        }
    }

    /// Drops the record for `registry` if it still holds `lease`.
    pub fn evict(&self, service: ServiceId, registry: &RegistryId, lease: LeaseId) -> Option<RegistrationRecord> {
        let key = (service, registry.clone());
        let mut slots = self.slots.write();
        let holds = matches!(slots.get(&key), Some(Slot::Registered(r)) if r.lease.id() == lease);
        if !holds {
            return None;
        }
        match slots.remove(&key) {
            Some(Slot::Registered(record)) => Some(record),
            _ => None,
        }
    }

    pub fn get(&self, service: ServiceId, registry: &RegistryId) -> Option<RegistrationRecord> {
        match self.slots.read().get(&(service, registry.clone())) {
            Some(Slot::Registered(record)) => Some(record.clone()),
            _ => None,
        }
    }

    pub fn is_registering(&self, service: ServiceId, registry: &RegistryId) -> bool {
        matches!(self.slots.read().get(&(service, registry.clone())), Some(Slot::Registering))
    }

    pub fn records(&self) -> Vec<RegistrationRecord> {
        self.slots
            .read()
            .values()
            .filter_map(|slot| match slot {
                Slot::Registered(record) => Some(record.clone()),
                Slot::Registering => None,
            })
            .collect()
    }

    pub fn snapshot(&self) -> Vec<RecordSnapshot> {
        let mut snapshot: Vec<RecordSnapshot> = self.records().iter().map(RecordSnapshot::from).collect();
        snapshot.sort_by(|a, b| a.registry.cmp(&b.registry));
        snapshot
    }

    pub fn registered_count(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| matches!(slot, Slot::Registered(_)))
            .count()
    }
}

/// Exclusive right to register one pair. Dropping it without completing
/// frees the slot again.
pub struct ClaimGuard<'a> {
    table: &'a RegistrationTable,
    key: Option<Key>,
}

impl ClaimGuard<'_> {
    pub fn complete(mut self, record: RegistrationRecord) {
        if let Some(key) = self.key.take() {
            self.table.slots.write().insert(key, Slot::Registered(record));
        }
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.table.slots.write().remove(&key);
        }
    }
}
