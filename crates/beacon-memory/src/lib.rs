//! In-process stand-ins for the collaborators the join pipeline talks to.

pub mod registry;
pub mod exporter;
pub mod discovery;

pub use registry::{MemoryRegistry, RenewCall};
pub use exporter::LoopbackExporter;
pub use discovery::LocalDiscovery;
