//! Conversion between domain records and their wire representation.
//!
//! [`to_external`] is total and never fails. [`to_internal`] is its inverse
//! and rejects wire records that cannot describe a persisted address: an
//! unspecified type, a missing mandatory field, an unparsable address or an
//! address outside its parent prefix are all `InvalidArgument`. Identifiers,
//! addresses and prefixes must be in the canonical text form `to_external`
//! produces (e.g. `2001:db8::5`, not `2001:DB8::5`), so the two directions
//! are exact inverses.

use std::net::IpAddr;

use ipnet::IpNet;
use uuid::Uuid;

use crate::api;
use crate::error::{IpError, IpResult};
use crate::ip::query::IpQuery;
use crate::ip::types::{AddressFamily, AddressRecord, IpType};
use crate::tag::TagSet;

impl From<IpType> for api::IpType {
    fn from(t: IpType) -> Self {
        match t {
            IpType::Ephemeral => api::IpType::Ephemeral,
            IpType::Static => api::IpType::Static,
        }
    }
}

impl TryFrom<api::IpType> for IpType {
    type Error = IpError;

    fn try_from(t: api::IpType) -> Result<Self, Self::Error> {
        match t {
            api::IpType::Ephemeral => Ok(IpType::Ephemeral),
            api::IpType::Static => Ok(IpType::Static),
            api::IpType::Unspecified => Err(IpError::invalid("ip type cannot be unspecified")),
        }
    }
}

impl From<AddressFamily> for api::IpAddressFamily {
    fn from(af: AddressFamily) -> Self {
        match af {
            AddressFamily::V4 => api::IpAddressFamily::V4,
            AddressFamily::V6 => api::IpAddressFamily::V6,
        }
    }
}

impl TryFrom<api::IpAddressFamily> for AddressFamily {
    type Error = IpError;

    fn try_from(af: api::IpAddressFamily) -> Result<Self, Self::Error> {
        match af {
            api::IpAddressFamily::V4 => Ok(AddressFamily::V4),
            api::IpAddressFamily::V6 => Ok(AddressFamily::V6),
            api::IpAddressFamily::Unspecified => {
                Err(IpError::invalid("unsupported address family"))
            }
        }
    }
}

/// Render a record for callers
pub fn to_external(record: &AddressRecord) -> api::Ip {
    api::Ip {
        id: record.id.clone(),
        uuid: record.allocation_id.to_string(),
        ip: record.address.to_string(),
        parent_prefix: record.parent_prefix.to_string(),
        name: record.name.clone(),
        description: record.description.clone(),
        network: record.network_id.clone(),
        project: record.project_id.clone(),
        ip_type: record.ip_type.into(),
        tags: record.tags.to_strings(),
        created_at: Some(record.created_at),
        updated_at: Some(record.updated_at),
    }
}

fn required<'a>(value: &'a str, field: &str) -> IpResult<&'a str> {
    if value.is_empty() {
        return Err(IpError::invalid(format!("{field} must be set")));
    }
    Ok(value)
}

fn canonical<T: ToString>(field: &str, raw: &str, parsed: &T) -> IpResult<()> {
    let normalized = parsed.to_string();
    if normalized != raw {
        return Err(IpError::invalid(format!(
            "{field} {raw:?} is not in canonical form, expected {normalized:?}"
        )));
    }
    Ok(())
}

/// Rebuild a domain record from its wire form
pub fn to_internal(ip: &api::Ip) -> IpResult<AddressRecord> {
    let id = required(&ip.id, "id")?;
    let allocation_id = Uuid::parse_str(required(&ip.uuid, "uuid")?)
        .map_err(|e| IpError::invalid(format!("invalid uuid {:?}: {e}", ip.uuid)))?;
    let address: IpAddr = required(&ip.ip, "ip")?
        .parse()
        .map_err(|e| IpError::invalid(format!("invalid ip {:?}: {e}", ip.ip)))?;
    let parent_prefix: IpNet = required(&ip.parent_prefix, "parent_prefix")?
        .parse()
        .map_err(|e| {
            IpError::invalid(format!("invalid parent prefix {:?}: {e}", ip.parent_prefix))
        })?;
    canonical("uuid", &ip.uuid, &allocation_id)?;
    canonical("ip", &ip.ip, &address)?;
    canonical("parent prefix", &ip.parent_prefix, &parent_prefix)?;
    if !parent_prefix.contains(&address) {
        return Err(IpError::invalid(format!(
            "ip {address} is not contained in parent prefix {parent_prefix}"
        )));
    }
    let network_id = required(&ip.network, "network")?;
    let project_id = required(&ip.project, "project")?;
    let ip_type = IpType::try_from(ip.ip_type)?;
    let tags = TagSet::from_strings_strict(&ip.tags)
        .map_err(|key| IpError::invalid(format!("duplicate tag key {key:?}")))?;
    let created_at = ip
        .created_at
        .ok_or_else(|| IpError::invalid("created_at must be set"))?;
    let updated_at = ip
        .updated_at
        .ok_or_else(|| IpError::invalid("updated_at must be set"))?;

    Ok(AddressRecord {
        id: id.to_string(),
        allocation_id,
        address,
        parent_prefix,
        network_id: network_id.to_string(),
        project_id: project_id.to_string(),
        name: ip.name.clone(),
        description: ip.description.clone(),
        ip_type,
        tags,
        created_at,
        updated_at,
    })
}

impl TryFrom<&api::IpListRequest> for IpQuery {
    type Error = IpError;

    fn try_from(rq: &api::IpListRequest) -> Result<Self, Self::Error> {
        let address = rq
            .ip
            .as_deref()
            .map(|ip| {
                ip.parse::<IpAddr>()
                    .map_err(|e| IpError::invalid(format!("invalid ip {ip:?}: {e}")))
            })
            .transpose()?;
        let allocation_id = rq
            .uuid
            .as_deref()
            .map(|uuid| {
                Uuid::parse_str(uuid)
                    .map_err(|e| IpError::invalid(format!("invalid uuid {uuid:?}: {e}")))
            })
            .transpose()?;
        let parent_prefix = rq
            .parent_prefix
            .as_deref()
            .map(|prefix| {
                prefix
                    .parse::<IpNet>()
                    .map_err(|e| IpError::invalid(format!("invalid prefix {prefix:?}: {e}")))
            })
            .transpose()?;
        // unspecified means "no restriction" in a filter
        let ip_type = match rq.ip_type {
            None | Some(api::IpType::Unspecified) => None,
            Some(t) => Some(IpType::try_from(t)?),
        };
        let family = match rq.address_family {
            None | Some(api::IpAddressFamily::Unspecified) => None,
            Some(af) => Some(AddressFamily::try_from(af)?),
        };

        Ok(IpQuery {
            address,
            network_id: rq.network.clone(),
            project_id: rq.project.clone(),
            name: rq.name.clone(),
            allocation_id,
            machine_id: rq.machine_id.clone(),
            parent_prefix,
            tags: TagSet::from_strings(&rq.tags),
            ip_type,
            family,
        })
    }
}
