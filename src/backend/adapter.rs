//! Translation between domain calls and the allocator's message shapes.

use std::net::IpAddr;
use std::sync::Arc;

use ipnet::IpNet;

use crate::backend::{AcquireIpRequest, Allocator, Code, ReleaseIpRequest};
use crate::context::RequestContext;
use crate::error::IpError;

/// Why an acquisition did not produce an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    /// No free address left in the prefix
    Exhausted,
    /// The requested specific address is already allocated
    Taken,
    /// Anything else, already classified
    Failed(IpError),
}

/// Outcome of a successful release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Released,
    /// The allocator did not hold the address any more
    AlreadyAbsent,
}

/// Domain-facing wrapper around an [`Allocator`]
#[derive(Clone)]
pub struct AllocatorAdapter {
    allocator: Arc<dyn Allocator>,
}

impl AllocatorAdapter {
    pub fn new(allocator: Arc<dyn Allocator>) -> Self {
        Self { allocator }
    }

    /// Acquire `specific` from `prefix`, or any free address when `None`.
    ///
    /// The returned address is checked to lie inside `prefix` (and to equal
    /// `specific` when one was requested); a misbehaving allocator is
    /// reported as an internal error.
    pub async fn acquire(
        &self,
        ctx: &RequestContext,
        prefix: &IpNet,
        specific: Option<IpAddr>,
    ) -> Result<IpAddr, AcquireError> {
        let req = AcquireIpRequest {
            prefix_cidr: prefix.to_string(),
            ip: specific.map(|ip| ip.to_string()),
        };

        let resp = match ctx.run(self.allocator.acquire_ip(req)).await {
            Err(interrupted) => return Err(AcquireError::Failed(interrupted)),
            Ok(Err(e)) => {
                return Err(match e.code {
                    Code::NotFound => AcquireError::Exhausted,
                    Code::AlreadyExists => AcquireError::Taken,
                    _ => AcquireError::Failed(IpError::internal(e.to_string())),
                })
            }
            Ok(Ok(resp)) => resp,
        };

        let ip: IpAddr = resp.ip.parse().map_err(|e| {
            AcquireError::Failed(IpError::internal(format!(
                "allocator returned unparsable ip {:?}: {e}",
                resp.ip
            )))
        })?;
        if !prefix.contains(&ip) {
            return Err(AcquireError::Failed(IpError::internal(format!(
                "allocator returned ip {ip} outside of prefix {prefix}"
            ))));
        }
        if let Some(wanted) = specific {
            if wanted != ip {
                return Err(AcquireError::Failed(IpError::internal(format!(
                    "allocator returned ip {ip} instead of requested {wanted}"
                ))));
            }
        }
        Ok(ip)
    }

    /// Release `ip` back into `prefix`. An address the allocator no longer
    /// knows is reported as [`Release::AlreadyAbsent`], not as an error.
    pub async fn release(
        &self,
        ctx: &RequestContext,
        ip: IpAddr,
        prefix: &IpNet,
    ) -> Result<Release, IpError> {
        let req = ReleaseIpRequest {
            ip: ip.to_string(),
            prefix_cidr: prefix.to_string(),
        };
        match ctx.run(self.allocator.release_ip(req)).await? {
            Ok(()) => Ok(Release::Released),
            Err(e) if e.code == Code::NotFound => Ok(Release::AlreadyAbsent),
            Err(e) => Err(IpError::internal(e.to_string())),
        }
    }
}
