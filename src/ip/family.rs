//! Address family resolution for allocation requests.

use std::net::IpAddr;

use crate::api::IpAddressFamily;
use crate::error::{IpError, IpResult};
use crate::ip::types::{AddressFamily, Network};

/// Decide which address family an allocation targets.
///
/// # Arguments
/// * `requested` - Family asked for by the caller, if any
/// * `specific_ip` - Literal address asked for by the caller, if any
/// * `network` - Network the address is allocated from
///
/// # Returns
/// * The family of `specific_ip` when one is given
/// * The requested family when the network offers it
/// * The network's only family, or v4 when it offers both
///
/// A specific address and a family are mutually exclusive, an unspecified
/// family is never defaulted, and malformed literals are rejected.
pub fn resolve(
    requested: Option<IpAddressFamily>,
    specific_ip: Option<&str>,
    network: &Network,
) -> IpResult<AddressFamily> {
    if specific_ip.is_some() && requested.is_some() {
        return Err(IpError::invalid(
            "it is not possible to specify specific ip and address family",
        ));
    }

    if let Some(literal) = specific_ip {
        let ip: IpAddr = literal.parse().map_err(|e| {
            IpError::invalid(format!("unable to parse specific ip {literal:?}: {e}"))
        })?;
        return Ok(AddressFamily::of(&ip));
    }

    if let Some(requested) = requested {
        let af = AddressFamily::try_from(requested)?;
        if !network.supports(af) {
            return Err(IpError::invalid(format!(
                "there is no prefix for the given address family {af} present in network {}",
                network.id
            )));
        }
        return Ok(af);
    }

    match network.address_families.as_slice() {
        [only] => Ok(*only),
        _ => Ok(AddressFamily::V4),
    }
}
