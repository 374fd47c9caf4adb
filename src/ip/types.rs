//! Domain types for address records and the entities they belong to.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tag::TagSet;

/// IP address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Family of a concrete address
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    /// Family of a prefix
    pub fn of_prefix(prefix: &IpNet) -> Self {
        match prefix {
            IpNet::V4(_) => AddressFamily::V4,
            IpNet::V6(_) => AddressFamily::V6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AddressFamily::V4 => "IPv4",
            AddressFamily::V6 => "IPv6",
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retention policy of an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpType {
    /// Released together with its consumer
    #[default]
    Ephemeral,
    /// Outlives its consumer
    Static,
}

impl fmt::Display for IpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpType::Ephemeral => f.write_str("ephemeral"),
            IpType::Static => f.write_str("static"),
        }
    }
}

/// Tenant owning networks and addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
}

impl Project {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Network from which addresses are allocated.
///
/// `prefixes` are kept in the order the operator listed them; allocation
/// walks them in that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    /// Owning project, empty for provider networks
    #[serde(default)]
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_network_id: Option<String>,
    #[serde(default)]
    pub shared: bool,
    pub prefixes: Vec<IpNet>,
    pub address_families: Vec<AddressFamily>,
}

impl Network {
    /// Create a root network. Address families are derived from `prefixes`.
    pub fn new(id: impl Into<String>, project_id: impl Into<String>, prefixes: Vec<IpNet>) -> Self {
        let mut address_families = Vec::new();
        for prefix in &prefixes {
            let family = AddressFamily::of_prefix(prefix);
            if !address_families.contains(&family) {
                address_families.push(family);
            }
        }
        Self {
            id: id.into(),
            project_id: project_id.into(),
            parent_network_id: None,
            shared: false,
            prefixes,
            address_families,
        }
    }

    pub fn with_parent(mut self, parent_network_id: impl Into<String>) -> Self {
        self.parent_network_id = Some(parent_network_id.into());
        self
    }

    pub fn with_shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    /// Prefixes of the given family, in listed order
    pub fn prefixes_of(&self, family: AddressFamily) -> impl Iterator<Item = &IpNet> {
        self.prefixes
            .iter()
            .filter(move |prefix| AddressFamily::of_prefix(prefix) == family)
    }

    pub fn supports(&self, family: AddressFamily) -> bool {
        self.address_families.contains(&family)
    }

    /// True for networks carved out of a parent network
    pub fn has_parent(&self) -> bool {
        self.parent_network_id
            .as_deref()
            .is_some_and(|parent| !parent.is_empty())
    }
}

/// A concrete address together with the prefix it was drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub address: IpAddr,
    pub prefix: IpNet,
}

/// Persisted record of an allocated address.
///
/// `id` is assigned by the store on creation and is empty before that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub id: String,
    pub allocation_id: Uuid,
    pub address: IpAddr,
    pub parent_prefix: IpNet,
    pub network_id: String,
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub ip_type: IpType,
    #[serde(default)]
    pub tags: TagSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AddressRecord {
    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.address)
    }

    pub fn machine_id(&self) -> Option<&str> {
        self.tags.machine_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    #[test]
    fn test_families_follow_prefixes() {
        let nw = Network::new(
            "n1",
            "p1",
            vec![net("10.0.0.0/24"), net("2001:db8::/64"), net("10.1.0.0/24")],
        );
        assert_eq!(nw.address_families, vec![AddressFamily::V4, AddressFamily::V6]);
        assert!(nw.supports(AddressFamily::V6));

        let v4: Vec<_> = nw.prefixes_of(AddressFamily::V4).collect();
        assert_eq!(v4, vec![&net("10.0.0.0/24"), &net("10.1.0.0/24")]);
    }

    #[test]
    fn test_has_parent() {
        let nw = Network::new("n1", "p1", vec![]);
        assert!(!nw.has_parent());
        assert!(!nw.clone().with_parent("").has_parent());
        assert!(nw.with_parent("super").has_parent());
    }

    #[test]
    fn test_ip_type_defaults_to_ephemeral() {
        assert_eq!(IpType::default(), IpType::Ephemeral);
        assert_eq!(IpType::Static.to_string(), "static");
    }
}
