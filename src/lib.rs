//! # ipledger - IP address lifecycle management for multi-tenant clusters
//!
//! ipledger manages address records drawn from administratively defined
//! network prefixes. It does not reserve addresses itself: an external
//! allocator owns the address space and an external store keeps the records.
//! This crate orchestrates both.
//!
//! ## Overview
//!
//! - **Allocation**: random or specific addresses, trying a network's
//!   prefixes in their listed order
//! - **Address families**: v4 and v6, derived from the request or defaulted
//!   from the network
//! - **Scoping**: tenants only see and change their own project's addresses;
//!   private child networks are reserved for their owner
//! - **Machine addresses**: addresses bound to a machine are hidden from
//!   listings
//! - **Failure handling**: allocator and store errors are mapped into one
//!   error taxonomy ([`error::IpError`])
//!
//! ## Architecture
//!
//! - `api`: wire records and requests, conversion to and from domain types
//! - `backend`: collaborator traits (allocator, store, lookups) and in-memory
//!   implementations
//! - `ip`: domain types, family resolution, allocation, scoping, repository
//! - `service`: tenant and admin request handlers
//! - `config` / `config_loader`: YAML configuration
//! - `context`: per-request cancellation and deadlines
//! - `tag`: tag sets and the reserved machine tag
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ipledger::backend::memory::{MemoryAllocator, MemoryNetworks, MemoryProjects, MemoryStore};
//! use ipledger::context::RequestContext;
//! use ipledger::ip::Backends;
//! use ipledger::{api, config_loader, service::IpService};
//!
//! # async fn run() -> color_eyre::Result<()> {
//! let config = config_loader::load_config("ipledger.yaml".as_ref())?;
//! let backends = Backends {
//!     store: Arc::new(MemoryStore::new()),
//!     allocator: Arc::new(MemoryAllocator::new()),
//!     networks: Arc::new(MemoryNetworks::new(config.networks())),
//!     projects: Arc::new(MemoryProjects::new(config.projects())),
//! };
//! let service = IpService::new(backends, config.repository_options());
//!
//! let ctx = RequestContext::with_timeout(config.general.request_timeout);
//! let ip = service
//!     .create(
//!         &ctx,
//!         &api::IpCreateRequest {
//!             project: "p1".to_string(),
//!             network: "internet".to_string(),
//!             ..Default::default()
//!         },
//!     )
//!     .await?;
//! println!("{}", ip.ip);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod backend;
pub mod config;
pub mod config_loader;
pub mod context;
pub mod error;
pub mod ip;
pub mod service;
pub mod tag;
