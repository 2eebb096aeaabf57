pub mod id;
pub mod entry;
pub mod descriptor;
pub mod proxy;
pub mod registry;
pub mod lease;
pub mod discovery;
pub mod errors;
pub mod time;

pub use id::ServiceId;
pub use entry::{Entry, StatusType};
pub use descriptor::{ServiceDescriptor, ServiceDescriptorBuilder};
pub use proxy::{ProxyFactory, ProxyHandle, RemoteService};
pub use registry::{LookupRegistry, Registration, RegistryHandle, RegistryId};
pub use lease::{LeaseDuration, LeaseId};
pub use discovery::{Discovery, DiscoveryEvent, DiscoveryScope};
pub use errors::{DescriptorError, ExportError, JoinError, RemoteError, RenewalError};
pub use time::{Clock, RuntimeClock};
