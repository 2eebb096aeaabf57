use async_trait::async_trait;
use beacon_core::{
    Clock, LeaseDuration, LeaseId, LookupRegistry, ProxyHandle, Registration, RemoteError, RenewalError,
    ServiceDescriptor, ServiceId,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// One renewal the registry accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewCall {
    pub lease: LeaseId,
    /// Clock time the request arrived.
    pub at: u64,
    /// Expiration the lease had when the request arrived.
    pub previous_expiration: u64,
    pub expiration: u64,
}

struct Item {
    registration_id: Uuid,
    lease: LeaseId,
    proxy: Option<ProxyHandle>,
}

#[derive(Default)]
struct State {
    items: HashMap<ServiceId, Item>,
    leases: HashMap<LeaseId, u64>,
    failing_registrations: u64,
    failing_renewals: u64,
    deny_renewals: bool,
    register_calls: u64,
    renewals: Vec<RenewCall>,
}

/// Lookup registry kept in memory. Grants at most `max_lease` per request.
///
/// Registering a service id that is already present replaces the old item
/// and cancels its lease, the way lookup services treat re-registration.
pub struct MemoryRegistry {
    group: String,
    clock: Arc<dyn Clock>,
    max_lease: Duration,
    latency: Duration,
    state: Mutex<State>,
}

impl MemoryRegistry {
    pub fn new(group: impl Into<String>, clock: Arc<dyn Clock>, max_lease: Duration) -> Self {
        Self {
            group: group.into(),
            clock,
            max_lease,
            latency: Duration::ZERO,
            state: Mutex::new(State::default()),
        }
    }

    /// Delay applied to every registration request.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// The next `count` registration requests fail with a remote error.
    pub fn fail_next_registrations(&self, count: u64) {
        self.state.lock().failing_registrations = count;
    }

    /// The next `count` renewal requests fail in transit, without reaching
    /// the lease table.
    pub fn fail_next_renewals(&self, count: u64) {
        self.state.lock().failing_renewals = count;
    }

    pub fn deny_renewals(&self, deny: bool) {
        self.state.lock().deny_renewals = deny;
    }

    pub fn register_calls(&self) -> u64 {
        self.state.lock().register_calls
    }

    /// Registered items whose lease has not expired.
    pub fn live_registrations(&self) -> usize {
        let now = self.clock.now_millis();
        let state = self.state.lock();
        state
            .items
            .values()
            .filter(|item| state.leases.get(&item.lease).is_some_and(|exp| *exp > now))
            .count()
    }

    pub fn lease_expiration(&self, lease: LeaseId) -> Option<u64> {
        self.state.lock().leases.get(&lease).copied()
    }

    pub fn proxy_of(&self, service: ServiceId) -> Option<ProxyHandle> {
        self.state.lock().items.get(&service).and_then(|item| item.proxy.clone())
    }

    pub fn renewals(&self) -> Vec<RenewCall> {
        self.state.lock().renewals.clone()
    }

    fn grant(&self, requested: LeaseDuration) -> u64 {
        let granted = u64::try_from(requested.capped(self.max_lease).as_millis()).unwrap_or(u64::MAX);
        self.clock.now_millis().saturating_add(granted)
    }
}

#[async_trait]
impl LookupRegistry for MemoryRegistry {
    async fn register(
        &self,
        descriptor: &ServiceDescriptor,
        requested: LeaseDuration,
    ) -> Result<Registration, RemoteError> {
        if !self.latency.is_zero() {
            self.clock.sleep(self.latency).await;
        }

        let mut state = self.state.lock();
        state.register_calls += 1;
        if state.failing_registrations > 0 {
            state.failing_registrations -= 1;
            return Err(RemoteError(format!("registry {} unavailable", self.group)));
        }

        let lease = LeaseId::generate();
        let expiration = self.grant(requested);
        let item = Item {
            registration_id: Uuid::new_v4(),
            lease,
            proxy: descriptor.proxy().cloned(),
        };
        let registration_id = item.registration_id;
        if let Some(previous) = state.items.insert(descriptor.id(), item) {
            state.leases.remove(&previous.lease);
        }
        state.leases.insert(lease, expiration);

        Ok(Registration {
            registration_id,
            lease_id: lease,
            expiration,
        })
    }

    async fn renew(&self, lease: LeaseId, requested: LeaseDuration) -> Result<u64, RenewalError> {
        let now = self.clock.now_millis();
        let mut state = self.state.lock();
        if state.failing_renewals > 0 {
            state.failing_renewals -= 1;
            return Err(RemoteError(format!("registry {} unavailable", self.group)).into());
        }
        if state.deny_renewals {
            return Err(RenewalError::Denied(format!("registry {} refuses renewals", self.group)));
        }

        let previous_expiration = match state.leases.get(&lease) {
            Some(exp) if *exp > now => *exp,
            Some(_) => return Err(RenewalError::Denied(format!("lease {lease} expired"))),
            None => return Err(RenewalError::Denied(format!("unknown lease {lease}"))),
        };

        let expiration = self.grant(requested);
        state.leases.insert(lease, expiration);
        state.renewals.push(RenewCall {
            lease,
            at: now,
            previous_expiration,
            expiration,
        });
        Ok(expiration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::RuntimeClock;

    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::builder(ServiceId::generate()).name("svc").build().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn grants_are_capped() {
        let clock = Arc::new(RuntimeClock::starting_at(0));
        let registry = MemoryRegistry::new("public", clock, Duration::from_secs(10));

        let registration = registry.register(&descriptor(), LeaseDuration::Forever).await.unwrap();
        assert_eq!(registration.expiration, 10_000);
    }

    #[tokio::test(start_paused = true)]
    async fn reregistration_replaces_previous_item() {
        let clock = Arc::new(RuntimeClock::starting_at(0));
        let registry = MemoryRegistry::new("public", clock, Duration::from_secs(10));
        let d = descriptor();

        let first = registry.register(&d, LeaseDuration::Forever).await.unwrap();
        let second = registry.register(&d, LeaseDuration::Forever).await.unwrap();

        assert_eq!(registry.live_registrations(), 1);
        assert!(registry.lease_expiration(first.lease_id).is_none());
        assert!(matches!(
            registry.renew(first.lease_id, LeaseDuration::Forever).await,
            Err(RenewalError::Denied(_))
        ));
        assert!(registry.renew(second.lease_id, LeaseDuration::Forever).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn scripted_failures_run_out() {
        let clock = Arc::new(RuntimeClock::starting_at(0));
        let registry = MemoryRegistry::new("public", clock, Duration::from_secs(10));
        registry.fail_next_registrations(2);
        let d = descriptor();

        assert!(registry.register(&d, LeaseDuration::Forever).await.is_err());
        assert!(registry.register(&d, LeaseDuration::Forever).await.is_err());
        assert!(registry.register(&d, LeaseDuration::Forever).await.is_ok());
        assert_eq!(registry.register_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn scripted_renewal_failures_are_remote_errors() {
        let clock = Arc::new(RuntimeClock::starting_at(0));
        let registry = MemoryRegistry::new("public", clock, Duration::from_secs(10));
        let registration = registry.register(&descriptor(), LeaseDuration::Forever).await.unwrap();
        registry.fail_next_renewals(1);

        assert!(matches!(
            registry.renew(registration.lease_id, LeaseDuration::Forever).await,
            Err(RenewalError::Remote(_))
        ));
        assert!(registry.renewals().is_empty());
        assert!(registry.renew(registration.lease_id, LeaseDuration::Forever).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lease_cannot_be_renewed() {
        let clock = Arc::new(RuntimeClock::starting_at(0));
        let registry = MemoryRegistry::new("public", clock.clone(), Duration::from_secs(1));
        let registration = registry.register(&descriptor(), LeaseDuration::Forever).await.unwrap();

        clock.sleep(Duration::from_secs(2)).await;
        assert_eq!(registry.live_registrations(), 0);
        assert!(registry.renew(registration.lease_id, LeaseDuration::Forever).await.is_err());
    }
}
