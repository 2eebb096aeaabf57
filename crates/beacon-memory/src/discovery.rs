use async_trait::async_trait;
use beacon_core::{Discovery, DiscoveryEvent, DiscoveryScope, RegistryHandle, RemoteError};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

struct Subscriber {
    scope: DiscoveryScope,
    events: mpsc::UnboundedSender<DiscoveryEvent>,
}

/// Discovery over a set of registries known in-process.
///
/// A subscription first receives every matching known registry, then any
/// later [`announce`](Self::announce) or [`discard`](Self::discard).
#[derive(Default)]
pub struct LocalDiscovery {
    known: Mutex<Vec<(String, RegistryHandle)>>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl LocalDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes registries of `group` known and tells current subscribers.
    pub fn announce(&self, group: &str, registries: Vec<RegistryHandle>) {
        {
            let mut known = self.known.lock();
            for registry in &registries {
                if !known.iter().any(|(_, r)| r == registry) {
                    known.push((group.to_string(), registry.clone()));
                }
            }
        }
        self.publish(group, DiscoveryEvent::Discovered(registries));
    }

    pub fn discard(&self, group: &str, registries: Vec<RegistryHandle>) {
        self.known.lock().retain(|(_, r)| !registries.contains(r));
        self.publish(group, DiscoveryEvent::Discarded(registries));
    }

    fn publish(&self, group: &str, event: DiscoveryEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| !s.events.is_closed());
        for subscriber in subscribers.iter().filter(|s| s.scope.includes(group)) {
            if subscriber.events.send(event.clone()).is_err() {
                debug!(group, "subscriber went away");
            }
        }
    }
}

#[async_trait]
impl Discovery for LocalDiscovery {
    async fn subscribe(
        &self,
        scope: &DiscoveryScope,
    ) -> Result<mpsc::UnboundedReceiver<DiscoveryEvent>, RemoteError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let initial: Vec<RegistryHandle> = self
            .known
            .lock()
            .iter()
            .filter(|(group, _)| scope.includes(group))
            .map(|(_, r)| r.clone())
            .collect();
        if !initial.is_empty() {
            tx.send(DiscoveryEvent::Discovered(initial))
                .map_err(|e| RemoteError(e.to_string()))?;
        }

        self.subscribers.lock().push(Subscriber {
            scope: scope.clone(),
            events: tx,
        });
        Ok(rx)
    }
}
