//! Listing criteria handed to the store.
//!
//! The repository treats an [`IpQuery`] as opaque and passes it through;
//! stores translate it into whatever their backend understands.
//! [`IpQuery::matches`] is the reference semantics used by the in-memory
//! store.

use std::net::IpAddr;

use ipnet::IpNet;
use uuid::Uuid;

use crate::ip::types::{AddressFamily, AddressRecord, IpType};
use crate::tag::TagSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpQuery {
    pub address: Option<IpAddr>,
    pub network_id: Option<String>,
    pub project_id: Option<String>,
    pub name: Option<String>,
    pub allocation_id: Option<Uuid>,
    pub machine_id: Option<String>,
    pub parent_prefix: Option<IpNet>,
    /// Every tag listed here must be present on a match
    pub tags: TagSet,
    pub ip_type: Option<IpType>,
    pub family: Option<AddressFamily>,
}

impl IpQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_network(mut self, network_id: impl Into<String>) -> Self {
        self.network_id = Some(network_id.into());
        self
    }

    pub fn matches(&self, record: &AddressRecord) -> bool {
        fn eq<T: PartialEq>(want: &Option<T>, have: &T) -> bool {
            want.as_ref().map_or(true, |w| w == have)
        }

        eq(&self.address, &record.address)
            && eq(&self.network_id, &record.network_id)
            && eq(&self.project_id, &record.project_id)
            && eq(&self.name, &record.name)
            && eq(&self.allocation_id, &record.allocation_id)
            && eq(&self.parent_prefix, &record.parent_prefix)
            && eq(&self.ip_type, &record.ip_type)
            && eq(&self.family, &record.family())
            && self
                .machine_id
                .as_deref()
                .map_or(true, |m| record.machine_id() == Some(m))
            && record.tags.contains_all(&self.tags)
    }
}
