use beacon_core::{
    Clock, JoinError, LeaseDuration, ProxyFactory, ProxyHandle, RegistryHandle, RegistryId, RemoteService,
    RenewalError, RuntimeClock, ServiceDescriptor, ServiceId,
};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_RETRY_DELAY_MS;
use crate::lease::Lease;
use crate::lease_manager::{LeaseManager, LogRenewalFailure, RenewalListener, RenewalTarget};
use crate::table::{Claim, RegistrationRecord, RegistrationTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered,
    /// Another batch holds the slot and is still retrying.
    InFlight,
    AlreadyRegistered,
}

/// Per-registry outcome of one [`Registrar::register`] call, in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<(RegistryId, RegistrationOutcome)>,
}

impl BatchReport {
    pub fn outcome(&self, registry: &RegistryId) -> Option<RegistrationOutcome> {
        self.outcomes.iter().find(|(id, _)| id == registry).map(|(_, o)| *o)
    }

    pub fn registered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == RegistrationOutcome::Registered)
            .count()
    }
}

/// Registers one descriptor with every registry it is handed and passes
/// the resulting leases to the [`LeaseManager`].
pub struct Registrar {
    descriptor: Arc<ServiceDescriptor>,
    service: Arc<dyn RemoteService>,
    exporter: Arc<dyn ProxyFactory>,
    leases: Arc<LeaseManager>,
    table: Arc<RegistrationTable>,
    clock: Arc<dyn Clock>,
    retry_delay: Duration,
    on_failure: Arc<dyn RenewalListener>,
    export_lock: Mutex<()>,
}

impl Registrar {
    pub fn new(
        descriptor: Arc<ServiceDescriptor>,
        service: Arc<dyn RemoteService>,
        exporter: Arc<dyn ProxyFactory>,
        leases: Arc<LeaseManager>,
        table: Arc<RegistrationTable>,
    ) -> Self {
        let on_failure = evicting(&table, descriptor.id(), Arc::new(LogRenewalFailure));
        Self {
            descriptor,
            service,
            exporter,
            leases,
            table,
            clock: Arc::new(RuntimeClock::new()),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            on_failure,
            export_lock: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Listener told about renewal failures, after the failed record has
    /// been dropped from the table.
    pub fn with_failure_listener(mut self, listener: Arc<dyn RenewalListener>) -> Self {
        self.on_failure = evicting(&self.table, self.descriptor.id(), listener);
        self
    }

    pub fn descriptor(&self) -> &Arc<ServiceDescriptor> {
        &self.descriptor
    }

    pub fn table(&self) -> &Arc<RegistrationTable> {
        &self.table
    }

    /// Exports the service and attaches the proxy to the descriptor, once.
    /// Later calls return the attached proxy.
    pub fn ensure_exported(&self) -> Result<ProxyHandle, JoinError> {
        let _guard = self.export_lock.lock();
        if let Some(proxy) = self.descriptor.proxy() {
            return Ok(proxy.clone());
        }

        let proxy = self.exporter.export(self.service.clone())?;
        self.descriptor.attach_proxy(proxy.clone())?;
        info!(service = %self.descriptor.id(), endpoint = %proxy.endpoint, "service exported");
        Ok(proxy)
    }

    /// Registers with each registry, retrying transient failures forever.
    ///
    /// Registries are worked concurrently: a registry that keeps failing
    /// only holds up its own entry in the report.
    pub async fn register(&self, registries: Vec<RegistryHandle>) -> Result<BatchReport, JoinError> {
        self.ensure_exported()?;

        let mut seen = HashSet::new();
        let registries: Vec<RegistryHandle> = registries
            .into_iter()
            .filter(|r| seen.insert(r.id().clone()))
            .collect();

        let outcomes = join_all(registries.into_iter().map(|r| self.register_one(r))).await;
        Ok(BatchReport { outcomes })
    }

    async fn register_one(&self, registry: RegistryHandle) -> (RegistryId, RegistrationOutcome) {
        let service = self.descriptor.id();
        let guard = match self.table.claim(service, registry.id()) {
            Claim::Claimed(guard) => guard,
            Claim::InFlight => {
                debug!(registry = %registry.id(), "registration already in flight");
                return (registry.id().clone(), RegistrationOutcome::InFlight);
            }
            Claim::Registered => {
                debug!(registry = %registry.id(), "already registered");
                return (registry.id().clone(), RegistrationOutcome::AlreadyRegistered);
            }
        };

        let mut attempt: u64 = 0;
        let registration = loop {
            attempt += 1;
            metrics::counter!("beacon_registration_attempts_total").increment(1);
            match registry.remote().register(&self.descriptor, LeaseDuration::Forever).await {
                Ok(registration) => break registration,
                Err(err) => {
                    warn!(registry = %registry.id(), attempt, error = %err, "registration failed, retrying");
                    self.clock.sleep(self.retry_delay).await;
                }
            }
        };

        let lease = Arc::new(Lease::new(
            registration.lease_id,
            registry.clone(),
            registration.expiration,
            LeaseDuration::Forever,
        ));
        info!(
            registry = %registry.id(),
            lease = %lease.id(),
            attempt,
            expires_in_ms = registration.expiration.saturating_sub(self.clock.now_millis()),
            "service registered"
        );
        metrics::counter!("beacon_registrations_total").increment(1);

        guard.complete(RegistrationRecord {
            descriptor: self.descriptor.clone(),
            registry: registry.clone(),
            registration_id: registration.registration_id,
            lease: lease.clone(),
        });
        self.leases.renew_until(lease, RenewalTarget::Forever, self.on_failure.clone());

        (registry.id().clone(), RegistrationOutcome::Registered)
    }
}

/// Wraps `downstream` so a failed lease's record is evicted first, which
/// lets a later discovery of the same registry register again.
fn evicting(
    table: &Arc<RegistrationTable>,
    service: ServiceId,
    downstream: Arc<dyn RenewalListener>,
) -> Arc<dyn RenewalListener> {
    let table = table.clone();
    Arc::new(move |lease: &Arc<Lease>, error: &RenewalError| {
        table.evict(service, lease.registry().id(), lease.id());
        downstream.on_renewal_failed(lease, error);
    })
}
