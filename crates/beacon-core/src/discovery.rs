use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::RemoteError;
use crate::registry::RegistryHandle;

/// Which registry groups a discovery subscription covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoveryScope {
    #[default]
    AllGroups,
    Groups(Vec<String>),
}

impl DiscoveryScope {
    pub fn includes(&self, group: &str) -> bool {
        match self {
            DiscoveryScope::AllGroups => true,
            DiscoveryScope::Groups(groups) => groups.iter().any(|g| g == group),
        }
    }
}

#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    Discovered(Vec<RegistryHandle>),
    Discarded(Vec<RegistryHandle>),
}

/// Push-based discovery channel.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn subscribe(
        &self,
        scope: &DiscoveryScope,
    ) -> Result<mpsc::UnboundedReceiver<DiscoveryEvent>, RemoteError>;
}
