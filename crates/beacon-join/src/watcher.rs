use beacon_core::{DiscoveryEvent, JoinError, RegistryHandle};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info};

use crate::registrar::{BatchReport, Registrar};

/// Completion signal for one discovery-triggered registration batch.
pub struct BatchHandle {
    handle: JoinHandle<Result<BatchReport, JoinError>>,
}

impl BatchHandle {
    pub async fn wait(self) -> Result<BatchReport, JoinError> {
        self.handle
            .await
            .map_err(|e| JoinError::BatchAborted(e.to_string()))?
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// Bridges discovery events to the [`Registrar`]. Handlers only spawn work,
/// so the discovery channel is never held up by a registration.
pub struct DiscoveryWatcher {
    registrar: Arc<Registrar>,
}

impl DiscoveryWatcher {
    pub fn new(registrar: Arc<Registrar>) -> Self {
        Self { registrar }
    }

    pub fn on_discovered(&self, registries: Vec<RegistryHandle>) -> BatchHandle {
        BatchHandle {
            handle: tokio::spawn(Self::batch(self.registrar.clone(), registries)),
        }
    }

    /// Registrations bound to a discarded registry are kept; their leases
    /// keep renewing until the registry denies them.
    pub fn on_discarded(&self, registries: &[RegistryHandle]) {
        for registry in registries {
            info!(registry = %registry.id(), "registry discarded, registration left in place");
        }
    }

    /// Consumes a discovery subscription. Once it closes, batches already
    /// started keep running until they finish; aborting this task is the
    /// only way to cancel them.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<DiscoveryEvent>) {
        let mut batches = JoinSet::new();
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(DiscoveryEvent::Discovered(registries)) => {
                        batches.spawn(Self::batch(self.registrar.clone(), registries));
                    }
                    Some(DiscoveryEvent::Discarded(registries)) => self.on_discarded(&registries),
                    None => break,
                },
                Some(done) = batches.join_next(), if !batches.is_empty() => log_batch(done),
            }
        }

        info!(pending = batches.len(), "discovery channel closed");
        while let Some(done) = batches.join_next().await {
            log_batch(done);
        }
    }

    fn batch(
        registrar: Arc<Registrar>,
        registries: Vec<RegistryHandle>,
    ) -> impl Future<Output = Result<BatchReport, JoinError>> + Send + 'static {
        info!(count = registries.len(), "discovered service registrars");
        async move { registrar.register(registries).await }
    }
}

fn log_batch(done: Result<Result<BatchReport, JoinError>, tokio::task::JoinError>) {
    match done {
        Ok(Ok(report)) => info!(
            registered = report.registered(),
            total = report.outcomes.len(),
            "registration batch finished"
        ),
        Ok(Err(err)) => error!(error = %err, "registration batch failed"),
        Err(err) => error!(error = %err, "registration batch aborted"),
    }
}
