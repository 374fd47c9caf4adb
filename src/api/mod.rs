//! External representation of address records and requests.
//!
//! These are the shapes callers exchange with the services: plain strings for
//! addresses, identifiers and tags, and enums that carry an explicit
//! `Unspecified` value the way protobuf enums do. Conversions to and from the
//! domain types live in [`convert`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod convert;

pub use convert::{to_external, to_internal};

/// Wire form of the address retention policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpType {
    #[default]
    Unspecified,
    Ephemeral,
    Static,
}

/// Wire form of the address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpAddressFamily {
    #[default]
    Unspecified,
    V4,
    V6,
}

/// An address record as returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ip {
    pub id: String,
    /// Allocation identifier
    pub uuid: String,
    pub ip: String,
    pub parent_prefix: String,
    pub name: String,
    pub description: String,
    pub network: String,
    pub project: String,
    #[serde(rename = "type")]
    pub ip_type: IpType,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Request to allocate a new address
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IpCreateRequest {
    pub project: String,
    pub network: String,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Specific address to allocate; mutually exclusive with `address_family`
    pub ip: Option<String>,
    /// Bind the address to a machine; stored as the reserved machine tag
    pub machine_id: Option<String>,
    #[serde(rename = "type")]
    pub ip_type: Option<IpType>,
    pub address_family: Option<IpAddressFamily>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Request to change the mutable fields of an address
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IpUpdateRequest {
    /// Record id
    pub ip: String,
    pub project: String,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub ip_type: Option<IpType>,
    /// Replaces all tags when present
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IpGetRequest {
    pub ip: String,
    pub project: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IpDeleteRequest {
    pub ip: String,
    pub project: String,
}

/// Listing criteria; every set field narrows the result
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IpListRequest {
    pub ip: Option<String>,
    pub network: Option<String>,
    pub project: Option<String>,
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub machine_id: Option<String>,
    pub parent_prefix: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(rename = "type")]
    pub ip_type: Option<IpType>,
    pub address_family: Option<IpAddressFamily>,
}
