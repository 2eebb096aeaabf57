use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ExportError;

/// Local service implementation that remote callers reach through a proxy.
pub trait RemoteService: Send + Sync {
    fn invoke(&self);
}

/// Opaque, remotely invokable handle produced by a [`ProxyFactory`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyHandle {
    pub id: Uuid,
    pub endpoint: String,
}

impl ProxyHandle {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint: endpoint.into(),
        }
    }
}

/// Turns a local implementation into a handle remote callers can invoke.
pub trait ProxyFactory: Send + Sync {
    fn export(&self, service: std::sync::Arc<dyn RemoteService>) -> Result<ProxyHandle, ExportError>;
}
