use beacon_core::{
    Clock, Discovery, JoinError, ProxyFactory, ProxyHandle, RemoteService, RuntimeClock, ServiceDescriptor,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::JoinConfig;
use crate::lease_manager::{LeaseManager, RenewalListener};
use crate::registrar::Registrar;
use crate::table::RegistrationTable;
use crate::watcher::DiscoveryWatcher;

/// Running discovery, registration and renewal pipeline for one descriptor.
pub struct JoinManager {
    registrar: Arc<Registrar>,
    leases: Arc<LeaseManager>,
    proxy: ProxyHandle,
    watcher: JoinHandle<()>,
}

impl JoinManager {
    pub fn builder(
        descriptor: Arc<ServiceDescriptor>,
        service: Arc<dyn RemoteService>,
        exporter: Arc<dyn ProxyFactory>,
    ) -> JoinManagerBuilder {
        JoinManagerBuilder {
            descriptor,
            service,
            exporter,
            config: JoinConfig::default(),
            clock: None,
            failure_listener: None,
        }
    }

    pub fn descriptor(&self) -> &Arc<ServiceDescriptor> {
        self.registrar.descriptor()
    }

    pub fn proxy(&self) -> &ProxyHandle {
        &self.proxy
    }

    pub fn table(&self) -> &Arc<RegistrationTable> {
        self.registrar.table()
    }

    pub fn leases(&self) -> &Arc<LeaseManager> {
        &self.leases
    }

    pub fn is_registered(&self) -> bool {
        self.table().registered_count() > 0
    }

    /// Stops watching for registries and stops renewing. Nothing is
    /// unregistered; outstanding leases expire on the registry side.
    pub fn shutdown(self) {
        self.watcher.abort();
        self.leases.shutdown();
        info!(service = %self.registrar.descriptor().id(), "join manager stopped");
    }
}

pub struct JoinManagerBuilder {
    descriptor: Arc<ServiceDescriptor>,
    service: Arc<dyn RemoteService>,
    exporter: Arc<dyn ProxyFactory>,
    config: JoinConfig,
    clock: Option<Arc<dyn Clock>>,
    failure_listener: Option<Arc<dyn RenewalListener>>,
}

impl JoinManagerBuilder {
    pub fn config(mut self, config: JoinConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn failure_listener(mut self, listener: Arc<dyn RenewalListener>) -> Self {
        self.failure_listener = Some(listener);
        self
    }

    /// Exports the service, subscribes to discovery and starts handling
    /// events. An export failure aborts startup.
    pub async fn start(self, discovery: &dyn Discovery) -> Result<JoinManager, JoinError> {
        self.config.validate()?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(RuntimeClock::new()));

        let leases = Arc::new(LeaseManager::new(clock.clone(), self.config.safety_margin())?);
        let table = Arc::new(RegistrationTable::new());
        let mut registrar = Registrar::new(self.descriptor, self.service, self.exporter, leases.clone(), table)
            .with_clock(clock)
            .with_retry_delay(self.config.retry_delay());
        if let Some(listener) = self.failure_listener {
            registrar = registrar.with_failure_listener(listener);
        }
        let registrar = Arc::new(registrar);

        let proxy = registrar.ensure_exported()?;
        let events = discovery
            .subscribe(&self.config.scope)
            .await
            .map_err(JoinError::Subscribe)?;

        let watcher = DiscoveryWatcher::new(registrar.clone());
        let watcher = tokio::spawn(watcher.run(events));
        info!(service = %registrar.descriptor().id(), scope = ?self.config.scope, "join manager started");

        Ok(JoinManager {
            registrar,
            leases,
            proxy,
            watcher,
        })
    }
}
