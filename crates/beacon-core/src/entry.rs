use serde::{Deserialize, Serialize};

/// Severity advertised through the `Status` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusType {
    Error,
    Severe,
    Major,
    Minor,
    Notice,
    Normal,
}

/// A named attribute advertised alongside the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entry {
    Name(String),
    Comment(String),
    ServiceType {
        display_name: String,
        short_description: String,
    },
    Status(StatusType),
    Location {
        floor: String,
        room: String,
        building: String,
    },
    Address {
        street: String,
        organization: String,
        organizational_unit: String,
        locality: String,
        state_or_province: String,
        postal_code: String,
        country: String,
    },
    ServiceInfo {
        name: String,
        manufacturer: String,
        vendor: String,
        version: String,
        model: String,
        serial_number: String,
    },
}

impl Entry {
    /// Entry kind, used when matching attributes by type.
    pub fn kind(&self) -> &'static str {
        match self {
            Entry::Name(_) => "Name",
            Entry::Comment(_) => "Comment",
            Entry::ServiceType { .. } => "ServiceType",
            Entry::Status(_) => "Status",
            Entry::Location { .. } => "Location",
            Entry::Address { .. } => "Address",
            Entry::ServiceInfo { .. } => "ServiceInfo",
        }
    }
}
