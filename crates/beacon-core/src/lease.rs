use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseId(Uuid);

impl LeaseId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lease length requested from a registry. The registry may grant less.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaseDuration {
    Forever,
    Bounded(Duration),
}

impl LeaseDuration {
    /// Clamps the request to `cap`, the longest lease a registry will grant.
    pub fn capped(self, cap: Duration) -> Duration {
        match self {
            LeaseDuration::Forever => cap,
            LeaseDuration::Bounded(d) => d.min(cap),
        }
    }
}
