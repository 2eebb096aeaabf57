use std::sync::OnceLock;

use crate::entry::{Entry, StatusType};
use crate::errors::DescriptorError;
use crate::id::ServiceId;
use crate::proxy::ProxyHandle;

/// The bundle advertised to every registry: identity, attribute entries and
/// the exported proxy.
///
/// Entries are fixed at construction. The proxy is attached exactly once,
/// before the first registration is attempted.
#[derive(Debug)]
pub struct ServiceDescriptor {
    id: ServiceId,
    entries: Vec<Entry>,
    proxy: OnceLock<ProxyHandle>,
}

impl ServiceDescriptor {
    pub fn builder(id: ServiceId) -> ServiceDescriptorBuilder {
        ServiceDescriptorBuilder {
            id,
            entries: Vec::new(),
        }
    }

    pub fn id(&self) -> ServiceId {
        self.id
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// First entry of the given kind, e.g. `"Name"`.
    pub fn entry(&self, kind: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.kind() == kind)
    }

    pub fn name(&self) -> Option<&str> {
        self.entries.iter().find_map(|e| match e {
            Entry::Name(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn proxy(&self) -> Option<&ProxyHandle> {
        self.proxy.get()
    }

    pub fn attach_proxy(&self, proxy: ProxyHandle) -> Result<(), DescriptorError> {
        self.proxy
            .set(proxy)
            .map_err(|_| DescriptorError::ProxyAlreadyAttached(self.id))
    }
}

pub struct ServiceDescriptorBuilder {
    id: ServiceId,
    entries: Vec<Entry>,
}

impl ServiceDescriptorBuilder {
    /// Appends an entry, ignoring exact duplicates so the entry list stays a set.
    pub fn entry(mut self, entry: Entry) -> Self {
        if !self.entries.contains(&entry) {
            self.entries.push(entry);
        }
        self
    }

    pub fn name(self, name: impl Into<String>) -> Self {
        self.entry(Entry::Name(name.into()))
    }

    pub fn comment(self, comment: impl Into<String>) -> Self {
        self.entry(Entry::Comment(comment.into()))
    }

    pub fn service_type(
        self,
        display_name: impl Into<String>,
        short_description: impl Into<String>,
    ) -> Self {
        self.entry(Entry::ServiceType {
            display_name: display_name.into(),
            short_description: short_description.into(),
        })
    }

    pub fn status(self, status: StatusType) -> Self {
        self.entry(Entry::Status(status))
    }

    pub fn location(
        self,
        floor: impl Into<String>,
        room: impl Into<String>,
        building: impl Into<String>,
    ) -> Self {
        self.entry(Entry::Location {
            floor: floor.into(),
            room: room.into(),
            building: building.into(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn address(
        self,
        street: impl Into<String>,
        organization: impl Into<String>,
        organizational_unit: impl Into<String>,
        locality: impl Into<String>,
        state_or_province: impl Into<String>,
        postal_code: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        self.entry(Entry::Address {
            street: street.into(),
            organization: organization.into(),
            organizational_unit: organizational_unit.into(),
            locality: locality.into(),
            state_or_province: state_or_province.into(),
            postal_code: postal_code.into(),
            country: country.into(),
        })
    }

    pub fn service_info(
        self,
        name: impl Into<String>,
        manufacturer: impl Into<String>,
        vendor: impl Into<String>,
        version: impl Into<String>,
        model: impl Into<String>,
        serial_number: impl Into<String>,
    ) -> Self {
        self.entry(Entry::ServiceInfo {
            name: name.into(),
            manufacturer: manufacturer.into(),
            vendor: vendor.into(),
            version: version.into(),
            model: model.into(),
            serial_number: serial_number.into(),
        })
    }

    pub fn build(self) -> Result<ServiceDescriptor, DescriptorError> {
        let named = self.entries.iter().any(|e| match e {
            Entry::Name(name) => !name.trim().is_empty(),
            _ => false,
        });
        if !named {
            return Err(DescriptorError::MissingName);
        }

        Ok(ServiceDescriptor {
            id: self.id,
            entries: self.entries,
            proxy: OnceLock::new(),
        })
    }
}
