//! Project scoping and network sharing rules.

use serde::{Deserialize, Serialize};

use crate::error::{IpError, IpResult};
use crate::ip::types::{Network, Project};

/// Visibility boundary a repository operates in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    /// Only records of this project are visible
    Project(String),
    /// Administrative access across all projects
    Unscoped,
}

impl Scope {
    pub fn project(id: impl Into<String>) -> Self {
        Scope::Project(id.into())
    }

    /// Whether a record owned by `project_id` is visible in this scope
    pub fn admits(&self, project_id: &str) -> bool {
        match self {
            Scope::Project(id) => id == project_id,
            Scope::Unscoped => true,
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        match self {
            Scope::Project(id) => Some(id),
            Scope::Unscoped => None,
        }
    }
}

/// Check that `project` may allocate from `network`.
///
/// Private child networks are reserved for their owning project. Shared
/// networks and root networks (no parent) are open to every project.
pub fn check_allocation(project: &Project, network: &Network) -> IpResult<()> {
    if !network.shared && network.has_parent() && project.id != network.project_id {
        return Err(IpError::PermissionDenied(format!(
            "can not allocate ip for project {:?} because network belongs to {:?} and the network is not shared",
            project.id, network.project_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn child(owner: &str) -> Network {
        Network::new("n1", owner, vec!["10.0.0.0/24".parse().unwrap()]).with_parent("super")
    }

    #[test]
    fn test_foreign_private_child_is_denied() {
        let err = check_allocation(&Project::new("p2"), &child("p1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_owner_shared_and_root_are_allowed() {
        assert!(check_allocation(&Project::new("p1"), &child("p1")).is_ok());
        assert!(check_allocation(&Project::new("p2"), &child("p1").with_shared(true)).is_ok());

        let root = Network::new("internet", "", vec!["203.0.113.0/24".parse().unwrap()]);
        assert!(check_allocation(&Project::new("p2"), &root).is_ok());
    }

    #[test]
    fn test_scope_admits() {
        assert!(Scope::project("p1").admits("p1"));
        assert!(!Scope::project("p1").admits("p2"));
        assert!(Scope::Unscoped.admits("p2"));
        assert_eq!(Scope::Unscoped.project_id(), None);
    }
}
