use beacon_core::{
    Clock, LeaseId, RegistryHandle, RegistryId, RemoteService, RenewalError, RuntimeClock, ServiceDescriptor,
    ServiceId, StatusType,
};
use beacon_join::{
    DiscoveryWatcher, Lease, LeaseManager, RegistrationOutcome, RegistrationTable, Registrar, RenewalListener,
};
use beacon_memory::{LoopbackExporter, MemoryRegistry};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const LEASE_CAP: Duration = Duration::from_secs(10);
const MARGIN: Duration = Duration::from_secs(1);

struct Echo;

impl RemoteService for Echo {
    fn invoke(&self) {}
}

struct Fixture {
    clock: Arc<RuntimeClock>,
    descriptor: Arc<ServiceDescriptor>,
    exporter: Arc<LoopbackExporter>,
    leases: Arc<LeaseManager>,
    table: Arc<RegistrationTable>,
    watcher: DiscoveryWatcher,
    failures: Arc<Mutex<Vec<LeaseId>>>,
}

fn fixture() -> Fixture {
    fixture_with(|registrar| registrar)
}

fn fixture_with(customize: impl FnOnce(Registrar) -> Registrar) -> Fixture {
    let clock = Arc::new(RuntimeClock::starting_at(0));
    let descriptor = Arc::new(
        ServiceDescriptor::builder(ServiceId::generate())
            .name("Test service")
            .comment("integration")
            .status(StatusType::Normal)
            .build()
            .unwrap(),
    );
    let exporter = Arc::new(LoopbackExporter::new("test"));
    let leases = Arc::new(LeaseManager::new(clock.clone(), MARGIN).unwrap());
    let table = Arc::new(RegistrationTable::new());

    let failures = Arc::new(Mutex::new(Vec::new()));
    let recorded = failures.clone();
    let listener: Arc<dyn RenewalListener> = Arc::new(move |lease: &Arc<Lease>, _: &RenewalError| {
        recorded.lock().push(lease.id());
    });

    let registrar = Registrar::new(descriptor.clone(), Arc::new(Echo), exporter.clone(), leases.clone(), table.clone())
        .with_clock(clock.clone())
        .with_failure_listener(listener);
    let registrar = Arc::new(customize(registrar));

    Fixture {
        clock,
        descriptor,
        exporter,
        leases,
        table,
        watcher: DiscoveryWatcher::new(registrar),
        failures,
    }
}

fn registry(name: &str, clock: &Arc<RuntimeClock>) -> (Arc<MemoryRegistry>, RegistryHandle) {
    let remote = Arc::new(MemoryRegistry::new("public", clock.clone(), LEASE_CAP));
    let handle = RegistryHandle::new(RegistryId::new(name), remote.clone());
    (remote, handle)
}

#[tokio::test(start_paused = true)]
async fn scenario_a_registers_everywhere_with_one_proxy() {
    let f = fixture();
    let (r1, h1) = registry("lookup://r1", &f.clock);
    let (r2, h2) = registry("lookup://r2", &f.clock);
    r2.fail_next_registrations(1);

    let started = tokio::time::Instant::now();
    let report = f.watcher.on_discovered(vec![h1.clone(), h2.clone()]).wait().await.unwrap();

    assert!(started.elapsed() <= Duration::from_millis(200));
    assert_eq!(report.registered(), 2);
    assert_eq!(f.table.registered_count(), 2);
    assert_eq!(r2.register_calls(), 2);

    let proxy = f.descriptor.proxy().cloned().unwrap();
    assert_eq!(r1.proxy_of(f.descriptor.id()), Some(proxy.clone()));
    assert_eq!(r2.proxy_of(f.descriptor.id()), Some(proxy));
    assert_eq!(f.exporter.export_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_registry_does_not_delay_others() {
    let f = fixture();
    let (_, h1) = registry("lookup://r1", &f.clock);
    let (r2, h2) = registry("lookup://r2", &f.clock);
    r2.fail_next_registrations(u64::MAX);

    let batch = f.watcher.on_discovered(vec![h1.clone(), h2.clone()]);
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(f.table.get(f.descriptor.id(), h1.id()).is_some());
    assert!(f.table.is_registering(f.descriptor.id(), h2.id()));
    assert!(!batch.is_finished());
    batch.abort();
}

#[tokio::test(start_paused = true)]
async fn scenario_b_denied_renewal_is_reported_once_and_isolated() {
    let f = fixture();
    let (r1, h1) = registry("lookup://r1", &f.clock);
    let (r2, h2) = registry("lookup://r2", &f.clock);
    f.watcher.on_discovered(vec![h1.clone(), h2.clone()]).wait().await.unwrap();

    let lease1 = f.table.get(f.descriptor.id(), h1.id()).unwrap().lease;
    let lease2 = f.table.get(f.descriptor.id(), h2.id()).unwrap().lease;
    r1.deny_renewals(true);

    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(*f.failures.lock(), vec![lease1.id()]);
    assert!(!f.leases.is_renewing(lease1.id()));
    assert!(f.table.get(f.descriptor.id(), h1.id()).is_none());

    // r2 kept its 9s cadence: renewals at 9s, 18s and 27s.
    let renewals = r2.renewals();
    assert_eq!(renewals.len(), 3);
    assert_eq!(renewals.iter().map(|c| c.at).collect::<Vec<_>>(), vec![9_000, 18_000, 27_000]);
    assert!(f.leases.is_renewing(lease2.id()));
    assert_eq!(lease2.expiration(), 37_000);
}

#[tokio::test(start_paused = true)]
async fn renewals_fire_a_safety_margin_before_expiry() {
    let f = fixture();
    let (r1, h1) = registry("lookup://r1", &f.clock);
    f.watcher.on_discovered(vec![h1]).wait().await.unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;

    let renewals = r1.renewals();
    assert!(renewals.len() >= 6);
    for call in renewals {
        assert!(call.at < call.previous_expiration);
        assert_eq!(call.previous_expiration - call.at, MARGIN.as_millis() as u64);
    }
}

#[tokio::test(start_paused = true)]
async fn scenario_c_overlapping_discoveries_register_once() {
    let f = fixture();
    let clock = f.clock.clone();
    let slow = Arc::new(MemoryRegistry::new("public", clock.clone(), LEASE_CAP).with_latency(Duration::from_millis(300)));
    let h1 = RegistryHandle::new(RegistryId::new("lookup://r1"), slow.clone());
    let (_, h2) = registry("lookup://r2", &clock);

    let first = f.watcher.on_discovered(vec![h1.clone()]);
    tokio::task::yield_now().await;
    let second = f.watcher.on_discovered(vec![h1.clone(), h2.clone()]);

    let first = first.wait().await.unwrap();
    let second = second.wait().await.unwrap();

    let mut outcomes = vec![first.outcome(h1.id()).unwrap(), second.outcome(h1.id()).unwrap()];
    outcomes.sort_by_key(|o| *o != RegistrationOutcome::Registered);
    assert_eq!(outcomes, vec![RegistrationOutcome::Registered, RegistrationOutcome::InFlight]);

    assert_eq!(slow.register_calls(), 1);
    assert_eq!(slow.live_registrations(), 1);
    assert_eq!(f.table.registered_count(), 2);
    assert_eq!(f.leases.len(), 2);
    assert_eq!(f.exporter.export_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn rediscovering_a_registered_registry_is_idempotent() {
    let f = fixture();
    let (r1, h1) = registry("lookup://r1", &f.clock);
    f.watcher.on_discovered(vec![h1.clone()]).wait().await.unwrap();
    let lease = f.table.get(f.descriptor.id(), h1.id()).unwrap().lease;

    let again = f.watcher.on_discovered(vec![h1.clone(), h1.clone()]).wait().await.unwrap();

    assert_eq!(again.outcomes, vec![(h1.id().clone(), RegistrationOutcome::AlreadyRegistered)]);
    assert_eq!(r1.register_calls(), 1);
    assert_eq!(f.leases.len(), 1);
    assert_eq!(f.table.get(f.descriptor.id(), h1.id()).unwrap().lease.id(), lease.id());
}

#[tokio::test(start_paused = true)]
async fn failed_lease_can_be_registered_again() {
    let f = fixture();
    let (r1, h1) = registry("lookup://r1", &f.clock);
    f.watcher.on_discovered(vec![h1.clone()]).wait().await.unwrap();
    let first = f.table.get(f.descriptor.id(), h1.id()).unwrap().lease;

    r1.deny_renewals(true);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(f.table.get(f.descriptor.id(), h1.id()).is_none());

    r1.deny_renewals(false);
    let report = f.watcher.on_discovered(vec![h1.clone()]).wait().await.unwrap();
    assert_eq!(report.outcome(h1.id()), Some(RegistrationOutcome::Registered));

    let second = f.table.get(f.descriptor.id(), h1.id()).unwrap().lease;
    assert_ne!(first.id(), second.id());
    assert_eq!(r1.live_registrations(), 1);
}

#[tokio::test(start_paused = true)]
async fn discarding_a_registry_leaves_its_registration_alone() {
    let f = fixture();
    let (r1, h1) = registry("lookup://r1", &f.clock);
    f.watcher.on_discovered(vec![h1.clone()]).wait().await.unwrap();
    let lease = f.table.get(f.descriptor.id(), h1.id()).unwrap().lease;

    f.watcher.on_discarded(&[h1.clone()]);
    tokio::time::sleep(Duration::from_secs(20)).await;

    assert!(f.table.get(f.descriptor.id(), h1.id()).is_some());
    assert!(f.leases.is_renewing(lease.id()));
    assert_eq!(r1.renewals().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn export_failure_fails_the_batch() {
    let clock = Arc::new(RuntimeClock::starting_at(0));
    let descriptor = Arc::new(ServiceDescriptor::builder(ServiceId::generate()).name("svc").build().unwrap());
    let leases = Arc::new(LeaseManager::new(clock.clone(), MARGIN).unwrap());
    let table = Arc::new(RegistrationTable::new());
    let registrar = Registrar::new(
        descriptor.clone(),
        Arc::new(Echo),
        Arc::new(LoopbackExporter::refusing("test")),
        leases,
        table.clone(),
    );
    let (r1, h1) = registry("lookup://r1", &clock);

    let result = DiscoveryWatcher::new(Arc::new(registrar)).on_discovered(vec![h1]).wait().await;

    assert!(matches!(result, Err(beacon_core::JoinError::Export(_))));
    assert!(descriptor.proxy().is_none());
    assert_eq!(r1.register_calls(), 0);
    assert_eq!(table.registered_count(), 0);
}

/// Clock whose waits return immediately, counting how often it was asked.
struct InstantClock {
    inner: RuntimeClock,
    sleeps: AtomicU64,
}

#[async_trait::async_trait]
impl Clock for InstantClock {
    fn now_millis(&self) -> u64 {
        self.inner.now_millis()
    }

    async fn sleep(&self, duration: Duration) {
        assert_eq!(duration, Duration::from_millis(100));
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn registration_never_gives_up_on_transient_failures() {
    let instant = Arc::new(InstantClock {
        inner: RuntimeClock::starting_at(0),
        sleeps: AtomicU64::new(0),
    });
    let f = fixture_with(|registrar| registrar.with_clock(instant.clone()));
    let (r1, h1) = registry("lookup://r1", &f.clock);
    r1.fail_next_registrations(5_000);

    let report = f.watcher.on_discovered(vec![h1.clone()]).wait().await.unwrap();

    assert_eq!(report.outcome(h1.id()), Some(RegistrationOutcome::Registered));
    assert_eq!(r1.register_calls(), 5_001);
    assert_eq!(instant.sleeps.load(Ordering::SeqCst), 5_000);
}
