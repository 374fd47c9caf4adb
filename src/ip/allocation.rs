//! Address acquisition across the prefixes of a network.
//!
//! Prefixes are tried in the order they are listed on the network and are
//! never re-sorted, so operators can steer allocation by prefix placement.

use std::net::IpAddr;

use crate::backend::{AcquireError, AllocatorAdapter};
use crate::context::RequestContext;
use crate::error::{IpError, IpResult};
use crate::ip::types::{AddressFamily, Allocation, Network};

#[derive(Clone)]
pub struct AllocationEngine {
    adapter: AllocatorAdapter,
}

impl AllocationEngine {
    pub fn new(adapter: AllocatorAdapter) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &AllocatorAdapter {
        &self.adapter
    }

    /// Acquire any free address of `family` from `network`.
    ///
    /// Exhausted prefixes are skipped; any other allocator failure aborts.
    pub async fn allocate_random(
        &self,
        ctx: &RequestContext,
        network: &Network,
        family: AddressFamily,
    ) -> IpResult<Allocation> {
        for prefix in network.prefixes_of(family) {
            match self.adapter.acquire(ctx, prefix, None).await {
                Ok(address) => {
                    return Ok(Allocation {
                        address,
                        prefix: *prefix,
                    })
                }
                Err(AcquireError::Exhausted) => {
                    log::debug!("Prefix {} of network {} is exhausted", prefix, network.id);
                    continue;
                }
                Err(AcquireError::Taken) => {
                    return Err(IpError::internal(format!(
                        "allocator reported a conflict for a random ip in prefix {prefix}"
                    )))
                }
                Err(AcquireError::Failed(e)) => return Err(e),
            }
        }

        Err(IpError::ResourceExhausted(format!(
            "cannot allocate free {family} ip in network {}, no ips left",
            network.id
        )))
    }

    /// Acquire exactly `literal` from the first prefix of `network` that
    /// contains it.
    pub async fn allocate_specific(
        &self,
        ctx: &RequestContext,
        network: &Network,
        literal: &str,
    ) -> IpResult<Allocation> {
        let ip: IpAddr = literal.parse().map_err(|e| {
            IpError::invalid(format!("unable to parse specific ip {literal:?}: {e}"))
        })?;
        let family = AddressFamily::of(&ip);

        let Some(prefix) = network.prefixes_of(family).find(|p| p.contains(&ip)) else {
            return Err(IpError::invalid(format!(
                "specific ip {ip} not contained in any of the defined prefixes of network {}",
                network.id
            )));
        };

        match self.adapter.acquire(ctx, prefix, Some(ip)).await {
            Ok(address) => Ok(Allocation {
                address,
                prefix: *prefix,
            }),
            Err(AcquireError::Taken) => {
                Err(IpError::Conflict(format!("ip {ip} already allocated")))
            }
            Err(AcquireError::Exhausted) => Err(IpError::internal(format!(
                "allocator does not know prefix {prefix} of ip {ip}"
            ))),
            Err(AcquireError::Failed(e)) => Err(e),
        }
    }
}
