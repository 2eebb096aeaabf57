pub mod config;
pub mod lease;
pub mod table;
pub mod lease_manager;
pub mod registrar;
pub mod watcher;
pub mod join;

pub use config::JoinConfig;
pub use lease::Lease;
pub use table::{Claim, ClaimGuard, RecordSnapshot, RegistrationRecord, RegistrationTable};
pub use lease_manager::{LeaseManager, LogRenewalFailure, RenewalListener, RenewalTarget};
pub use registrar::{BatchReport, RegistrationOutcome, Registrar};
pub use watcher::{BatchHandle, DiscoveryWatcher};
pub use join::{JoinManager, JoinManagerBuilder};
