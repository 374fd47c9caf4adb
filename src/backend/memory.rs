//! In-process collaborators.
//!
//! These back the command line tool and the tests. The allocator here is a
//! plain reference implementation: it scans a prefix for unused host
//! addresses and picks one of the first [`SCAN_LIMIT`] at random. It is not
//! meant for large deployments.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use ipnet::IpNet;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::backend::{
    AcquireIpRequest, AcquireIpResponse, Allocator, AllocatorError, Code, IpStore, NetworkLookup,
    ProjectLookup, ReleaseIpRequest, StoreError,
};
use crate::ip::query::IpQuery;
use crate::ip::types::{AddressRecord, Network, Project};

/// Number of free candidates collected before picking one at random
pub const SCAN_LIMIT: usize = 256;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Allocated addresses of one prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixAllocations {
    pub prefix: IpNet,
    pub addresses: Vec<IpAddr>,
}

/// Allocator keeping its address space in memory
#[derive(Debug)]
pub struct MemoryAllocator {
    allocated: Mutex<BTreeMap<IpNet, BTreeSet<IpAddr>>>,
    rng: Mutex<StdRng>,
    acquire_calls: AtomicUsize,
    release_calls: AtomicUsize,
}

impl Default for MemoryAllocator {
    fn default() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl MemoryAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic allocator for reproducible runs
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            allocated: Mutex::new(BTreeMap::new()),
            rng: Mutex::new(rng),
            acquire_calls: AtomicUsize::new(0),
            release_calls: AtomicUsize::new(0),
        }
    }

    pub fn acquire_calls(&self) -> usize {
        self.acquire_calls.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }

    pub fn is_allocated(&self, prefix: &IpNet, ip: &IpAddr) -> bool {
        lock(&self.allocated)
            .get(prefix)
            .is_some_and(|set| set.contains(ip))
    }

    /// Current allocations, prefix by prefix
    pub fn snapshot(&self) -> Vec<PrefixAllocations> {
        lock(&self.allocated)
            .iter()
            .map(|(prefix, set)| PrefixAllocations {
                prefix: *prefix,
                addresses: set.iter().copied().collect(),
            })
            .collect()
    }

    /// Replace all allocations with `snapshot`
    pub fn restore(&self, snapshot: Vec<PrefixAllocations>) {
        let mut allocated = lock(&self.allocated);
        allocated.clear();
        for entry in snapshot {
            allocated
                .entry(entry.prefix)
                .or_default()
                .extend(entry.addresses);
        }
    }

    fn parse_prefix(raw: &str) -> Result<IpNet, AllocatorError> {
        raw.parse().map_err(|e| {
            AllocatorError::new(Code::InvalidArgument, format!("invalid prefix {raw:?}: {e}"))
        })
    }

    fn parse_ip(raw: &str) -> Result<IpAddr, AllocatorError> {
        raw.parse().map_err(|e| {
            AllocatorError::new(Code::InvalidArgument, format!("invalid ip {raw:?}: {e}"))
        })
    }
}

#[async_trait]
impl Allocator for MemoryAllocator {
    async fn acquire_ip(&self, req: AcquireIpRequest) -> Result<AcquireIpResponse, AllocatorError> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        let prefix = Self::parse_prefix(&req.prefix_cidr)?;
        let mut allocated = lock(&self.allocated);
        let taken = allocated.entry(prefix).or_default();

        let ip = match req.ip.as_deref() {
            Some(raw) => {
                let ip = Self::parse_ip(raw)?;
                if !prefix.contains(&ip) {
                    return Err(AllocatorError::new(
                        Code::InvalidArgument,
                        format!("ip {ip} is not part of prefix {prefix}"),
                    ));
                }
                if taken.contains(&ip) {
                    return Err(AllocatorError::new(
                        Code::AlreadyExists,
                        format!("ip {ip} already allocated"),
                    ));
                }
                ip
            }
            None => {
                let free: Vec<IpAddr> = prefix
                    .hosts()
                    .filter(|ip| !taken.contains(ip))
                    .take(SCAN_LIMIT)
                    .collect();
                *free.choose(&mut *lock(&self.rng)).ok_or_else(|| {
                    AllocatorError::new(Code::NotFound, format!("no more ips in prefix {prefix}"))
                })?
            }
        };

        taken.insert(ip);
        Ok(AcquireIpResponse {
            ip: ip.to_string(),
            prefix_cidr: prefix.to_string(),
        })
    }

    async fn release_ip(&self, req: ReleaseIpRequest) -> Result<(), AllocatorError> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        let prefix = Self::parse_prefix(&req.prefix_cidr)?;
        let ip = Self::parse_ip(&req.ip)?;
        let mut allocated = lock(&self.allocated);
        match allocated.get_mut(&prefix).map(|set| set.remove(&ip)) {
            Some(true) => Ok(()),
            _ => Err(AllocatorError::new(
                Code::NotFound,
                format!("ip {ip} is not allocated in prefix {prefix}"),
            )),
        }
    }
}

/// Serializable content of a [`MemoryStore`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub next_id: u64,
    pub records: Vec<AddressRecord>,
}

/// Record store keeping insertion order
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<StoreSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            inner: Mutex::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        lock(&self.inner).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IpStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<AddressRecord, StoreError> {
        lock(&self.inner)
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("ip with id:{id}")))
    }

    async fn list(&self, query: &IpQuery) -> Result<Vec<AddressRecord>, StoreError> {
        Ok(lock(&self.inner)
            .records
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect())
    }

    async fn create(&self, mut record: AddressRecord) -> Result<AddressRecord, StoreError> {
        let mut inner = lock(&self.inner);
        if inner
            .records
            .iter()
            .any(|r| r.address == record.address && r.parent_prefix == record.parent_prefix)
        {
            return Err(StoreError::AlreadyExists(format!(
                "ip {} in prefix {}",
                record.address, record.parent_prefix
            )));
        }
        inner.next_id += 1;
        record.id = inner.next_id.to_string();
        inner.records.push(record.clone());
        Ok(record)
    }

    async fn update(&self, new: &AddressRecord, old: &AddressRecord) -> Result<(), StoreError> {
        let mut inner = lock(&self.inner);
        let stored = inner
            .records
            .iter_mut()
            .find(|r| r.id == old.id)
            .ok_or_else(|| StoreError::NotFound(format!("ip with id:{}", old.id)))?;
        if stored != old {
            return Err(StoreError::Conflict(format!("ip with id:{}", old.id)));
        }
        *stored = new.clone();
        Ok(())
    }

    async fn delete(&self, record: &AddressRecord) -> Result<(), StoreError> {
        let mut inner = lock(&self.inner);
        let pos = inner
            .records
            .iter()
            .position(|r| r.id == record.id)
            .ok_or_else(|| StoreError::NotFound(format!("ip with id:{}", record.id)))?;
        inner.records.remove(pos);
        Ok(())
    }
}

/// Fixed set of networks.
///
/// The project scope is not used to hide networks: every network is
/// resolvable by id and sharing rules are left to the repository.
#[derive(Debug, Default)]
pub struct MemoryNetworks {
    networks: HashMap<String, Network>,
}

impl MemoryNetworks {
    pub fn new(networks: impl IntoIterator<Item = Network>) -> Self {
        Self {
            networks: networks.into_iter().map(|n| (n.id.clone(), n)).collect(),
        }
    }
}

#[async_trait]
impl NetworkLookup for MemoryNetworks {
    async fn get(&self, _project_scope: &str, network_id: &str) -> Result<Network, StoreError> {
        self.networks
            .get(network_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("network {network_id}")))
    }
}

/// Fixed set of projects
#[derive(Debug, Default)]
pub struct MemoryProjects {
    projects: HashMap<String, Project>,
}

impl MemoryProjects {
    pub fn new(projects: impl IntoIterator<Item = Project>) -> Self {
        Self {
            projects: projects.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }
}

#[async_trait]
impl ProjectLookup for MemoryProjects {
    async fn get(&self, project_id: &str) -> Result<Project, StoreError> {
        self.projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("project {project_id}")))
    }
}
