//! Request handlers on top of the repository.
//!
//! [`IpService`] serves tenants: every call is scoped to the project named in
//! the request. [`AdminIpService`] lists across all projects.

use crate::api;
use crate::context::RequestContext;
use crate::error::{IpError, IpResult};
use crate::ip::query::IpQuery;
use crate::ip::repository::{Backends, IpRepository, RepositoryOptions};
use crate::ip::scope::Scope;

fn require_project(project: &str) -> IpResult<Scope> {
    if project.is_empty() {
        return Err(IpError::invalid("project must be given"));
    }
    Ok(Scope::project(project))
}

/// Tenant facing address operations
#[derive(Clone)]
pub struct IpService {
    backends: Backends,
    options: RepositoryOptions,
}

impl IpService {
    pub fn new(backends: Backends, options: RepositoryOptions) -> Self {
        Self { backends, options }
    }

    fn repository(&self, scope: Scope) -> IpRepository {
        IpRepository::new(self.backends.clone(), scope).with_options(self.options)
    }

    pub async fn get(&self, ctx: &RequestContext, req: &api::IpGetRequest) -> IpResult<api::Ip> {
        log::debug!("get ip {} in project {}", req.ip, req.project);
        let repo = self.repository(require_project(&req.project)?);
        let ip = repo.get(ctx, &req.ip).await?;
        Ok(api::to_external(&ip))
    }

    pub async fn create(
        &self,
        ctx: &RequestContext,
        req: &api::IpCreateRequest,
    ) -> IpResult<api::Ip> {
        log::debug!("create ip in network {} of project {}", req.network, req.project);
        let repo = self.repository(require_project(&req.project)?);
        let ip = repo.create(ctx, req).await?;
        Ok(api::to_external(&ip))
    }

    pub async fn update(
        &self,
        ctx: &RequestContext,
        req: &api::IpUpdateRequest,
    ) -> IpResult<api::Ip> {
        log::debug!("update ip {} in project {}", req.ip, req.project);
        let repo = self.repository(require_project(&req.project)?);
        let ip = repo.update(ctx, req).await?;
        Ok(api::to_external(&ip))
    }

    pub async fn delete(
        &self,
        ctx: &RequestContext,
        req: &api::IpDeleteRequest,
    ) -> IpResult<api::Ip> {
        log::debug!("delete ip {} in project {}", req.ip, req.project);
        let repo = self.repository(require_project(&req.project)?);
        let ip = repo.delete(ctx, &req.ip).await?;
        Ok(api::to_external(&ip))
    }

    /// Tenant listing. The request's project is mandatory and pins the scope.
    pub async fn list(
        &self,
        ctx: &RequestContext,
        req: &api::IpListRequest,
    ) -> IpResult<Vec<api::Ip>> {
        let project = req.project.as_deref().unwrap_or_default();
        log::debug!("list ips in project {project}");
        let repo = self.repository(require_project(project)?);
        let query = IpQuery::try_from(req)?;
        let ips = repo.list(ctx, query).await?;
        Ok(ips.iter().map(api::to_external).collect())
    }
}

/// Administrative address operations across projects
#[derive(Clone)]
pub struct AdminIpService {
    backends: Backends,
}

impl AdminIpService {
    pub fn new(backends: Backends) -> Self {
        Self { backends }
    }

    /// List addresses of any project. Machine bound addresses are still
    /// filtered out.
    pub async fn list(
        &self,
        ctx: &RequestContext,
        req: &api::IpListRequest,
    ) -> IpResult<Vec<api::Ip>> {
        log::debug!("admin list ips: {:?}", req);
        let repo = IpRepository::new(self.backends.clone(), Scope::Unscoped);
        let query = IpQuery::try_from(req)?;
        let ips = repo.list(ctx, query).await?;
        Ok(ips.iter().map(api::to_external).collect())
    }
}
