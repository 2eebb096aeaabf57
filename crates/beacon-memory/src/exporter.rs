use beacon_core::{ExportError, ProxyFactory, ProxyHandle, RemoteError, RemoteService};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Exports services to in-process callers. Invoking a handle dispatches
/// straight to the exported object.
pub struct LoopbackExporter {
    authority: String,
    refuse: bool,
    exports: RwLock<HashMap<Uuid, Arc<dyn RemoteService>>>,
}

impl LoopbackExporter {
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            refuse: false,
            exports: RwLock::new(HashMap::new()),
        }
    }

    /// An exporter whose every export fails.
    pub fn refusing(authority: impl Into<String>) -> Self {
        Self {
            refuse: true,
            ..Self::new(authority)
        }
    }

    pub fn export_count(&self) -> usize {
        self.exports.read().len()
    }

    pub fn invoke(&self, proxy: &ProxyHandle) -> Result<(), RemoteError> {
        let service = self
            .exports
            .read()
            .get(&proxy.id)
            .cloned()
            .ok_or_else(|| RemoteError(format!("no object exported at {}", proxy.endpoint)))?;
        service.invoke();
        Ok(())
    }
}

impl ProxyFactory for LoopbackExporter {
    fn export(&self, service: Arc<dyn RemoteService>) -> Result<ProxyHandle, ExportError> {
        if self.refuse {
            return Err(ExportError(format!("exporter {} refuses exports", self.authority)));
        }

        let mut exports = self.exports.write();
        let object = Arc::as_ptr(&service).cast::<()>();
        if exports.values().any(|s| Arc::as_ptr(s).cast::<()>() == object) {
            return Err(ExportError("object is already exported".into()));
        }

        let id = Uuid::new_v4();
        let proxy = ProxyHandle {
            id,
            endpoint: format!("loopback://{}/{}", self.authority, id),
        };
        exports.insert(id, service);
        info!(endpoint = %proxy.endpoint, "object exported");
        Ok(proxy)
    }
}
