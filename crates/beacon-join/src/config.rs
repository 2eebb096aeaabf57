use beacon_core::{DiscoveryScope, JoinError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;
pub const DEFAULT_SAFETY_MARGIN_MS: u64 = 1_000;

/// Tunables for the discovery, registration and renewal pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    /// Fixed wait between registration attempts against one registry.
    pub retry_delay_ms: u64,
    /// Lead time before lease expiration at which renewal fires.
    pub safety_margin_ms: u64,
    pub scope: DiscoveryScope,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            safety_margin_ms: DEFAULT_SAFETY_MARGIN_MS,
            scope: DiscoveryScope::AllGroups,
        }
    }
}

impl JoinConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_millis(self.safety_margin_ms)
    }

    pub fn validate(&self) -> Result<(), JoinError> {
        if self.safety_margin_ms == 0 {
            return Err(JoinError::Config("safety margin must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let config = JoinConfig::default();
        assert_eq!(config.retry_delay(), Duration::from_millis(100));
        assert_eq!(config.scope, DiscoveryScope::AllGroups);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_margin_is_rejected() {
        let config = JoinConfig {
            safety_margin_ms: 0,
            ..JoinConfig::default()
        };
        assert!(matches!(config.validate(), Err(JoinError::Config(_))));
    }
}
