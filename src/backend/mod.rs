//! Collaborator interfaces.
//!
//! The repository talks to four external systems, each behind a trait:
//!
//! - [`Allocator`]: the address allocator owning the address space of every
//!   prefix. It speaks in request/response messages and status codes; the
//!   [`adapter`] module translates them into domain terms.
//! - [`IpStore`]: durable storage of address records.
//! - [`NetworkLookup`] and [`ProjectLookup`]: read-only entity resolution.
//!
//! All calls are async and may be abandoned by the caller at any await point.
//! [`memory`] holds in-process implementations of every trait.

use std::fmt;

use async_trait::async_trait;

use crate::ip::query::IpQuery;
use crate::ip::types::{AddressRecord, Network, Project};

pub mod adapter;
pub mod memory;

pub use adapter::{AcquireError, AllocatorAdapter, Release};

/// Status codes reported by the allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// Prefix exhausted, or address not allocated on release
    NotFound,
    /// Specific address already taken
    AlreadyExists,
    InvalidArgument,
    Unavailable,
    Internal,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::InvalidArgument => "invalid_argument",
            Code::Unavailable => "unavailable",
            Code::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Error returned by the allocator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("allocator error ({code}): {message}")]
pub struct AllocatorError {
    pub code: Code,
    pub message: String,
}

impl AllocatorError {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Acquire an address from a prefix; any free one unless `ip` is set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireIpRequest {
    pub prefix_cidr: String,
    pub ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireIpResponse {
    pub ip: String,
    pub prefix_cidr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseIpRequest {
    pub ip: String,
    pub prefix_cidr: String,
}

/// External address allocator
#[async_trait]
pub trait Allocator: Send + Sync {
    async fn acquire_ip(&self, req: AcquireIpRequest) -> Result<AcquireIpResponse, AllocatorError>;

    async fn release_ip(&self, req: ReleaseIpRequest) -> Result<(), AllocatorError>;
}

/// Errors reported by the store and the entity lookups
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Optimistic concurrency check failed
    #[error("{0} was modified concurrently")]
    Conflict(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

/// Durable storage of address records
#[async_trait]
pub trait IpStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<AddressRecord, StoreError>;

    /// Records matching `query`, in store order
    async fn list(&self, query: &IpQuery) -> Result<Vec<AddressRecord>, StoreError>;

    /// Persist a new record and return it with its store-assigned id
    async fn create(&self, record: AddressRecord) -> Result<AddressRecord, StoreError>;

    /// Replace `old` with `new`. Stores may use `old` for optimistic
    /// concurrency checks or auditing.
    async fn update(&self, new: &AddressRecord, old: &AddressRecord) -> Result<(), StoreError>;

    async fn delete(&self, record: &AddressRecord) -> Result<(), StoreError>;
}

/// Resolve a network as seen from a project
#[async_trait]
pub trait NetworkLookup: Send + Sync {
    async fn get(&self, project_scope: &str, network_id: &str) -> Result<Network, StoreError>;
}

#[async_trait]
pub trait ProjectLookup: Send + Sync {
    async fn get(&self, project_id: &str) -> Result<Project, StoreError>;
}
