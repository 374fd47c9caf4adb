//! IP repository: create, update, delete, get and list address records.
//!
//! The repository coordinates two backends that fail independently, the
//! allocator and the store, without a shared transaction:
//!
//! - Create acquires the address first and persists afterwards. If the
//!   persist fails the address stays allocated upstream unless
//!   [`RepositoryOptions::release_on_persist_failure`] is set. A persist
//!   abandoned by cancellation or deadline is never compensated, since the
//!   record may have been committed.
//! - Delete releases first and removes the record afterwards. A release of
//!   an address the allocator no longer holds counts as success, so a delete
//!   that failed half way can simply be repeated.
//!
//! Every collaborator error is classified into [`IpError`] right where it is
//! observed.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::api;
use crate::backend::{
    Allocator, AllocatorAdapter, IpStore, NetworkLookup, ProjectLookup, Release, StoreError,
};
use crate::context::RequestContext;
use crate::error::{IpError, IpResult};
use crate::ip::allocation::AllocationEngine;
use crate::ip::family;
use crate::ip::query::IpQuery;
use crate::ip::scope::{self, Scope};
use crate::ip::types::{AddressRecord, IpType, Network, Project};
use crate::tag::{Tag, TagSet, MACHINE_ID};

/// Collaborators a repository works with
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn IpStore>,
    pub allocator: Arc<dyn Allocator>,
    pub networks: Arc<dyn NetworkLookup>,
    pub projects: Arc<dyn ProjectLookup>,
}

/// Policy switches of the repository
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepositoryOptions {
    /// Give an acquired address back to the allocator when persisting its
    /// record fails. Best effort: a failing release is only logged.
    pub release_on_persist_failure: bool,
}

fn store_error(err: StoreError) -> IpError {
    match err {
        StoreError::NotFound(what) => IpError::NotFound(format!("{what} not found")),
        StoreError::AlreadyExists(what) => IpError::Conflict(format!("{what} already exists")),
        StoreError::Conflict(what) => {
            IpError::Conflict(format!("{what} was modified concurrently"))
        }
        StoreError::Backend(msg) => IpError::Internal(msg),
    }
}

pub struct IpRepository {
    backends: Backends,
    engine: AllocationEngine,
    scope: Scope,
    options: RepositoryOptions,
}

impl IpRepository {
    pub fn new(backends: Backends, scope: Scope) -> Self {
        let engine = AllocationEngine::new(AllocatorAdapter::new(backends.allocator.clone()));
        Self {
            backends,
            engine,
            scope,
            options: RepositoryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RepositoryOptions) -> Self {
        self.options = options;
        self
    }

    /// Load a record visible in this repository's scope.
    ///
    /// Records of other projects are reported as not found.
    pub async fn get(&self, ctx: &RequestContext, id: &str) -> IpResult<AddressRecord> {
        let ip = ctx
            .run(self.backends.store.get(id))
            .await?
            .map_err(store_error)?;

        if !self.scope.admits(&ip.project_id) {
            return Err(IpError::not_found(format!("ip with id:{id} not found")));
        }

        Ok(ip)
    }

    async fn project(&self, ctx: &RequestContext, id: &str) -> IpResult<Project> {
        ctx.run(self.backends.projects.get(id))
            .await?
            .map_err(store_error)
    }

    async fn network(&self, ctx: &RequestContext, project: &str, id: &str) -> IpResult<Network> {
        ctx.run(self.backends.networks.get(project, id))
            .await?
            .map_err(store_error)
    }

    /// Allocate an address and persist its record
    pub async fn create(
        &self,
        ctx: &RequestContext,
        req: &api::IpCreateRequest,
    ) -> IpResult<AddressRecord> {
        let mut tags = TagSet::from_strings(&req.tags);
        if let Some(machine_id) = &req.machine_id {
            tags.insert(Tag::new(MACHINE_ID, machine_id.as_str()));
        }

        let project = self.project(ctx, &req.project).await?;
        let network = self.network(ctx, &project.id, &req.network).await?;

        let family = family::resolve(req.address_family, req.ip.as_deref(), &network)?;

        scope::check_allocation(&project, &network)?;

        // validated before acquisition so that a bad type never leaks an address
        let ip_type = match req.ip_type {
            Some(t) => IpType::try_from(t)?,
            None => IpType::Ephemeral,
        };

        let allocation = match req.ip.as_deref() {
            Some(literal) => self.engine.allocate_specific(ctx, &network, literal).await?,
            None => self.engine.allocate_random(ctx, &network, family).await?,
        };

        log::info!(
            "Allocated ip {} in prefix {} of network {} (type: {})",
            allocation.address,
            allocation.prefix,
            network.id,
            ip_type
        );

        let now = Utc::now();
        let ip = AddressRecord {
            id: String::new(),
            allocation_id: Uuid::now_v7(),
            address: allocation.address,
            parent_prefix: allocation.prefix,
            network_id: network.id.clone(),
            project_id: project.id.clone(),
            name: req.name.clone().unwrap_or_default(),
            description: req.description.clone().unwrap_or_default(),
            ip_type,
            tags,
            created_at: now,
            updated_at: now,
        };

        let persisted = match ctx.run(self.backends.store.create(ip)).await {
            Ok(Ok(persisted)) => persisted,
            Ok(Err(e)) => {
                let err = store_error(e);
                self.compensate(&allocation.address, &allocation.prefix, &err)
                    .await;
                return Err(err);
            }
            Err(interrupted) => {
                // the store may have committed before the call was abandoned
                log::warn!(
                    "Persisting ip {} was interrupted ({}), it may stay allocated in prefix {}",
                    allocation.address,
                    interrupted,
                    allocation.prefix
                );
                return Err(interrupted);
            }
        };

        Ok(persisted)
    }

    /// Runs detached from the request context, which may already be
    /// cancelled or past its deadline.
    async fn compensate(
        &self,
        address: &std::net::IpAddr,
        prefix: &ipnet::IpNet,
        cause: &IpError,
    ) {
        if !self.options.release_on_persist_failure {
            log::warn!(
                "Persisting ip {} failed ({}), address stays allocated in prefix {}",
                address,
                cause,
                prefix
            );
            return;
        }

        let ctx = RequestContext::new();
        match self.engine.adapter().release(&ctx, *address, prefix).await {
            Ok(_) => log::info!(
                "Released ip {} in prefix {} after failed persist",
                address,
                prefix
            ),
            Err(e) => log::warn!(
                "Compensating release of ip {} in prefix {} failed: {}",
                address,
                prefix,
                e
            ),
        }
    }

    /// Change the mutable fields of a record.
    ///
    /// Unset fields keep their value; `tags`, when present, replaces all tags.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        req: &api::IpUpdateRequest,
    ) -> IpResult<AddressRecord> {
        let old = self.get(ctx, &req.ip).await?;
        let mut new = old.clone();

        if let Some(description) = &req.description {
            new.description = description.clone();
        }
        if let Some(name) = &req.name {
            new.name = name.clone();
        }
        if let Some(t) = req.ip_type {
            new.ip_type = IpType::try_from(t)?;
        }
        if let Some(tags) = &req.tags {
            new.tags = TagSet::from_strings(tags);
        }
        new.updated_at = Utc::now();

        ctx.run(self.backends.store.update(&new, &old))
            .await?
            .map_err(store_error)?;

        Ok(new)
    }

    /// Release an address and remove its record
    pub async fn delete(&self, ctx: &RequestContext, id: &str) -> IpResult<AddressRecord> {
        let ip = self.get(ctx, id).await?;

        match self
            .engine
            .adapter()
            .release(ctx, ip.address, &ip.parent_prefix)
            .await?
        {
            Release::Released => {}
            Release::AlreadyAbsent => log::info!(
                "Ip {} was already released in prefix {}, removing record",
                ip.address,
                ip.parent_prefix
            ),
        }

        ctx.run(self.backends.store.delete(&ip))
            .await?
            .map_err(store_error)?;

        Ok(ip)
    }

    /// Records matching `query` that tenants may see.
    ///
    /// Within a project scope the query is pinned to that project. Machine
    /// bound addresses are never returned.
    pub async fn list(
        &self,
        ctx: &RequestContext,
        mut query: IpQuery,
    ) -> IpResult<Vec<AddressRecord>> {
        if let Some(project) = self.scope.project_id() {
            query.project_id = Some(project.to_string());
        }

        let ips = ctx
            .run(self.backends.store.list(&query))
            .await?
            .map_err(store_error)?;

        Ok(ips
            .into_iter()
            .filter(|ip| {
                if ip.tags.is_machine_bound() {
                    log::debug!("Hiding machine ip {} from listing", ip.address);
                    return false;
                }
                true
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryAllocator, MemoryNetworks, MemoryProjects, MemoryStore};
    use crate::error::ErrorKind;

    struct Fixture {
        store: Arc<MemoryStore>,
        allocator: Arc<MemoryAllocator>,
        backends: Backends,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let allocator = Arc::new(MemoryAllocator::with_seed(3));
        let networks = MemoryNetworks::new([
            Network::new("v4-only", "p1", vec!["10.0.0.0/24".parse().unwrap()]),
            Network::new(
                "dual",
                "p1",
                vec!["2001:db8::/64".parse().unwrap(), "10.1.0.0/24".parse().unwrap()],
            ),
            Network::new("private", "p1", vec!["10.2.0.0/24".parse().unwrap()])
                .with_parent("super"),
        ]);
        let projects = MemoryProjects::new([Project::new("p1"), Project::new("p2")]);
        let backends = Backends {
            store: store.clone(),
            allocator: allocator.clone(),
            networks: Arc::new(networks),
            projects: Arc::new(projects),
        };
        Fixture {
            store,
            allocator,
            backends,
        }
    }

    fn create_req(project: &str, network: &str) -> api::IpCreateRequest {
        api::IpCreateRequest {
            project: project.to_string(),
            network: network.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_defaults() {
        let f = fixture();
        let repo = IpRepository::new(f.backends.clone(), Scope::project("p1"));
        let ip = repo
            .create(&RequestContext::new(), &create_req("p1", "v4-only"))
            .await
            .unwrap();

        assert!(ip.address.is_ipv4());
        assert_eq!(ip.ip_type, IpType::Ephemeral);
        assert_eq!(ip.parent_prefix, "10.0.0.0/24".parse::<ipnet::IpNet>().unwrap());
        assert!(!ip.id.is_empty());
        assert_eq!(ip.allocation_id.get_version_num(), 7);
        assert_eq!(f.store.len(), 1);
    }

    #[tokio::test]
    async fn test_create_dual_stack_defaults_to_v4() {
        let f = fixture();
        let repo = IpRepository::new(f.backends.clone(), Scope::project("p1"));
        let ip = repo
            .create(&RequestContext::new(), &create_req("p1", "dual"))
            .await
            .unwrap();
        assert!(ip.address.is_ipv4());

        let mut req = create_req("p1", "dual");
        req.address_family = Some(api::IpAddressFamily::V6);
        let ip = repo.create(&RequestContext::new(), &req).await.unwrap();
        assert!(ip.address.is_ipv6());
    }

    #[tokio::test]
    async fn test_create_merges_machine_tag() {
        let f = fixture();
        let repo = IpRepository::new(f.backends.clone(), Scope::project("p1"));
        let mut req = create_req("p1", "v4-only");
        req.tags = vec![
            "env=dev".to_string(),
            format!("{MACHINE_ID}=stale"),
            "env=prod".to_string(),
        ];
        req.machine_id = Some("m-1".to_string());

        let ip = repo.create(&RequestContext::new(), &req).await.unwrap();
        assert_eq!(ip.machine_id(), Some("m-1"));
        assert_eq!(
            ip.tags.to_strings(),
            vec!["env=prod".to_string(), format!("{MACHINE_ID}=m-1")]
        );
    }

    #[tokio::test]
    async fn test_create_missing_entities() {
        let f = fixture();
        let repo = IpRepository::new(f.backends.clone(), Scope::project("p1"));
        let ctx = RequestContext::new();

        let err = repo.create(&ctx, &create_req("nope", "v4-only")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = repo.create(&ctx, &create_req("p1", "nope")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(f.allocator.acquire_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_unspecified_type_without_allocating() {
        let f = fixture();
        let repo = IpRepository::new(f.backends.clone(), Scope::project("p1"));
        let mut req = create_req("p1", "v4-only");
        req.ip_type = Some(api::IpType::Unspecified);

        let err = repo.create(&RequestContext::new(), &req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(f.allocator.acquire_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_cancelled_makes_no_calls() {
        let f = fixture();
        let repo = IpRepository::new(f.backends.clone(), Scope::project("p1"));
        let ctx = RequestContext::new();
        ctx.cancel();

        let err = repo.create(&ctx, &create_req("p1", "v4-only")).await.unwrap_err();
        assert_eq!(err, IpError::Canceled);
        assert_eq!(f.allocator.acquire_calls(), 0);
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_get_hides_other_projects() {
        let f = fixture();
        let owner = IpRepository::new(f.backends.clone(), Scope::project("p1"));
        let ip = owner
            .create(&RequestContext::new(), &create_req("p1", "v4-only"))
            .await
            .unwrap();

        let other = IpRepository::new(f.backends.clone(), Scope::project("p2"));
        let err = other.get(&RequestContext::new(), &ip.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let admin = IpRepository::new(f.backends.clone(), Scope::Unscoped);
        assert_eq!(admin.get(&RequestContext::new(), &ip.id).await.unwrap(), ip);
    }

    #[tokio::test]
    async fn test_update_is_partial() {
        let f = fixture();
        let repo = IpRepository::new(f.backends.clone(), Scope::project("p1"));
        let ctx = RequestContext::new();
        let mut req = create_req("p1", "v4-only");
        req.name = Some("web".to_string());
        req.description = Some("frontend".to_string());
        req.tags = vec!["env=prod".to_string()];
        let created = repo.create(&ctx, &req).await.unwrap();

        let updated = repo
            .update(
                &ctx,
                &api::IpUpdateRequest {
                    ip: created.id.clone(),
                    project: "p1".to_string(),
                    name: Some("api".to_string()),
                    ip_type: Some(api::IpType::Static),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "api");
        assert_eq!(updated.description, "frontend");
        assert_eq!(updated.ip_type, IpType::Static);
        assert_eq!(updated.tags, created.tags);
        assert_eq!(updated.address, created.address);
        assert_eq!(updated.parent_prefix, created.parent_prefix);
        assert_eq!(updated.network_id, created.network_id);
        assert_eq!(updated.project_id, created.project_id);
        assert_eq!(updated.allocation_id, created.allocation_id);
        assert_eq!(repo.get(&ctx, &created.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_update_replaces_tags_and_rejects_unspecified() {
        let f = fixture();
        let repo = IpRepository::new(f.backends.clone(), Scope::project("p1"));
        let ctx = RequestContext::new();
        let mut req = create_req("p1", "v4-only");
        req.tags = vec!["a=1".to_string(), "b=2".to_string()];
        let created = repo.create(&ctx, &req).await.unwrap();

        let updated = repo
            .update(
                &ctx,
                &api::IpUpdateRequest {
                    ip: created.id.clone(),
                    tags: Some(vec!["c=3".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.tags.to_strings(), vec!["c=3"]);

        let err = repo
            .update(
                &ctx,
                &api::IpUpdateRequest {
                    ip: created.id.clone(),
                    ip_type: Some(api::IpType::Unspecified),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_delete_releases_and_removes() {
        let f = fixture();
        let repo = IpRepository::new(f.backends.clone(), Scope::project("p1"));
        let ctx = RequestContext::new();
        let ip = repo.create(&ctx, &create_req("p1", "v4-only")).await.unwrap();
        assert!(f.allocator.is_allocated(&ip.parent_prefix, &ip.address));

        let deleted = repo.delete(&ctx, &ip.id).await.unwrap();
        assert_eq!(deleted.id, ip.id);
        assert!(!f.allocator.is_allocated(&ip.parent_prefix, &ip.address));
        assert!(f.store.is_empty());

        let err = repo.delete(&ctx, &ip.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_list_pins_scope_and_hides_machine_ips() {
        let f = fixture();
        let ctx = RequestContext::new();
        let p1 = IpRepository::new(f.backends.clone(), Scope::project("p1"));
        let p2 = IpRepository::new(f.backends.clone(), Scope::project("p2"));

        let tenant = p1.create(&ctx, &create_req("p1", "v4-only")).await.unwrap();
        let mut machine = create_req("p1", "v4-only");
        machine.machine_id = Some("m-1".to_string());
        p1.create(&ctx, &machine).await.unwrap();
        p2.create(&ctx, &create_req("p2", "v4-only")).await.unwrap();

        let ips = p1.list(&ctx, IpQuery::new().with_project("p2")).await.unwrap();
        assert_eq!(ips, vec![tenant]);

        let admin = IpRepository::new(f.backends.clone(), Scope::Unscoped);
        let ips = admin.list(&ctx, IpQuery::new()).await.unwrap();
        assert_eq!(ips.len(), 2);
        assert!(ips.iter().all(|ip| ip.machine_id().is_none()));
    }

    /// Store whose creates always fail
    struct ReadOnly(MemoryStore);

    #[async_trait::async_trait]
    impl IpStore for ReadOnly {
        async fn get(&self, id: &str) -> Result<AddressRecord, StoreError> {
            self.0.get(id).await
        }

        async fn list(&self, query: &IpQuery) -> Result<Vec<AddressRecord>, StoreError> {
            self.0.list(query).await
        }

        async fn create(&self, _record: AddressRecord) -> Result<AddressRecord, StoreError> {
            Err(StoreError::Backend("disk full".to_string()))
        }

        async fn update(&self, new: &AddressRecord, old: &AddressRecord) -> Result<(), StoreError> {
            self.0.update(new, old).await
        }

        async fn delete(&self, record: &AddressRecord) -> Result<(), StoreError> {
            self.0.delete(record).await
        }
    }

    /// Store that commits creates but never acknowledges them
    struct SlowAck(MemoryStore);

    #[async_trait::async_trait]
    impl IpStore for SlowAck {
        async fn get(&self, id: &str) -> Result<AddressRecord, StoreError> {
            self.0.get(id).await
        }

        async fn list(&self, query: &IpQuery) -> Result<Vec<AddressRecord>, StoreError> {
            self.0.list(query).await
        }

        async fn create(&self, record: AddressRecord) -> Result<AddressRecord, StoreError> {
            let committed = self.0.create(record).await;
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            committed
        }

        async fn update(&self, new: &AddressRecord, old: &AddressRecord) -> Result<(), StoreError> {
            self.0.update(new, old).await
        }

        async fn delete(&self, record: &AddressRecord) -> Result<(), StoreError> {
            self.0.delete(record).await
        }
    }

    fn single_host(
        store: Arc<dyn IpStore>,
        options: RepositoryOptions,
    ) -> (IpRepository, Arc<MemoryAllocator>) {
        let f = fixture();
        let backends = Backends {
            store,
            networks: Arc::new(MemoryNetworks::new([Network::new(
                "tiny",
                "p1",
                vec!["10.9.0.1/32".parse().unwrap()],
            )])),
            ..f.backends
        };
        let repo = IpRepository::new(backends, Scope::project("p1")).with_options(options);
        (repo, f.allocator)
    }

    #[tokio::test]
    async fn test_failed_persist_keeps_address_by_default() {
        let (repo, allocator) = single_host(
            Arc::new(ReadOnly(MemoryStore::new())),
            RepositoryOptions::default(),
        );
        let err = repo
            .create(&RequestContext::new(), &create_req("p1", "tiny"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(allocator.release_calls(), 0);
        assert!(allocator.is_allocated(
            &"10.9.0.1/32".parse().unwrap(),
            &"10.9.0.1".parse().unwrap()
        ));
    }

    #[tokio::test]
    async fn test_failed_persist_releases_when_enabled() {
        let (repo, allocator) = single_host(
            Arc::new(ReadOnly(MemoryStore::new())),
            RepositoryOptions {
                release_on_persist_failure: true,
            },
        );
        let err = repo
            .create(&RequestContext::new(), &create_req("p1", "tiny"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(allocator.release_calls(), 1);
        assert!(!allocator.is_allocated(
            &"10.9.0.1/32".parse().unwrap(),
            &"10.9.0.1".parse().unwrap()
        ));
    }

    #[tokio::test]
    async fn test_delete_tolerates_already_released_address() {
        let f = fixture();
        let repo = IpRepository::new(f.backends.clone(), Scope::project("p1"));
        let ctx = RequestContext::new();
        let ip = repo.create(&ctx, &create_req("p1", "v4-only")).await.unwrap();

        // released out of band, the record must still be removable
        AllocatorAdapter::new(f.allocator.clone())
            .release(&ctx, ip.address, &ip.parent_prefix)
            .await
            .unwrap();

        repo.delete(&ctx, &ip.id).await.unwrap();
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_private_child_network_of_other_project() {
        let f = fixture();
        let repo = IpRepository::new(f.backends.clone(), Scope::project("p2"));
        let err = repo
            .create(&RequestContext::new(), &create_req("p2", "private"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(f.allocator.acquire_calls(), 0);
    }

    #[tokio::test]
    async fn test_interrupted_persist_is_not_compensated() {
        let store = Arc::new(SlowAck(MemoryStore::new()));
        let (repo, allocator) = single_host(
            store.clone(),
            RepositoryOptions {
                release_on_persist_failure: true,
            },
        );

        let ctx = RequestContext::with_timeout(std::time::Duration::from_millis(50));
        let err = repo.create(&ctx, &create_req("p1", "tiny")).await.unwrap_err();
        assert_eq!(err, IpError::DeadlineExceeded);

        // the record was committed, so its address must stay allocated
        assert_eq!(store.0.len(), 1);
        assert_eq!(allocator.release_calls(), 0);
        assert!(allocator.is_allocated(
            &"10.9.0.1/32".parse().unwrap(),
            &"10.9.0.1".parse().unwrap()
        ));
    }
}
