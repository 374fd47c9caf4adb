//! IP address lifecycle management.
//!
//! Address records are created by acquiring an address from one of a
//! network's prefixes, updated in place, and deleted by releasing the address
//! again. [`repository::IpRepository`] orchestrates the other modules.

pub mod allocation;
pub mod family;
pub mod query;
pub mod repository;
pub mod scope;
pub mod types;

// Re-export commonly used types
pub use allocation::AllocationEngine;
pub use query::IpQuery;
pub use repository::{Backends, IpRepository, RepositoryOptions};
pub use scope::Scope;
pub use types::{AddressFamily, AddressRecord, Allocation, IpType, Network, Project};
