//! Configuration structures for ipledger.
//!
//! A configuration declares the projects and networks the in-memory lookups
//! serve, plus a few runtime settings:
//!
//! ```yaml
//! general:
//!   log_level: info
//!   request_timeout: 5s
//!   release_on_persist_failure: false
//!   state_file: ipledger-state.json
//!
//! projects:
//!   - id: p1
//!
//! networks:
//!   - id: internet
//!     project: p1
//!     shared: true
//!     prefixes: ["203.0.113.0/24", "2001:db8::/64"]
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::ip::repository::RepositoryOptions;
use crate::ip::types::{Network, Project};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Deadline of a single request, e.g. "5s" or "250ms"
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(default)]
    pub release_on_persist_failure: bool,
    /// State file used when none is given on the command line
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub id: String,
    pub project: String,
    #[serde(default)]
    pub parent_network: Option<String>,
    #[serde(default)]
    pub shared: bool,
    /// CIDR prefixes in allocation order
    pub prefixes: Vec<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            request_timeout: default_request_timeout(),
            release_on_persist_failure: false,
            state_file: None,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid project configuration: {0}")]
    InvalidProject(String),
    #[error("Invalid network configuration: {0}")]
    InvalidNetwork(String),
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.general.request_timeout.is_zero() {
            return Err(ValidationError::InvalidGeneral(
                "request_timeout must be greater than zero".to_string(),
            ));
        }

        let mut projects = HashSet::new();
        for project in &self.projects {
            if project.id.is_empty() {
                return Err(ValidationError::InvalidProject(
                    "project id cannot be empty".to_string(),
                ));
            }
            if !projects.insert(project.id.as_str()) {
                return Err(ValidationError::InvalidProject(format!(
                    "duplicate project id {:?}",
                    project.id
                )));
            }
        }

        let mut networks = HashSet::new();
        for network in &self.networks {
            if network.id.is_empty() {
                return Err(ValidationError::InvalidNetwork(
                    "network id cannot be empty".to_string(),
                ));
            }
            if !networks.insert(network.id.as_str()) {
                return Err(ValidationError::InvalidNetwork(format!(
                    "duplicate network id {:?}",
                    network.id
                )));
            }
            if !projects.contains(network.project.as_str()) {
                return Err(ValidationError::InvalidNetwork(format!(
                    "network {:?} references unknown project {:?}",
                    network.id, network.project
                )));
            }
            Self::validate_prefixes(network)?;
        }

        // parents may be declared after their children
        for network in &self.networks {
            if let Some(parent) = network.parent_network.as_deref().filter(|p| !p.is_empty()) {
                if !networks.contains(parent) {
                    return Err(ValidationError::InvalidNetwork(format!(
                        "network {:?} references unknown parent network {:?}",
                        network.id, parent
                    )));
                }
            }
        }

        Ok(())
    }

    fn validate_prefixes(network: &NetworkConfig) -> Result<(), ValidationError> {
        if network.prefixes.is_empty() {
            return Err(ValidationError::InvalidNetwork(format!(
                "network {:?} has no prefixes",
                network.id
            )));
        }
        for prefix in &network.prefixes {
            if let Err(e) = prefix.parse::<IpNet>() {
                return Err(ValidationError::InvalidNetwork(format!(
                    "network {:?} has invalid prefix {:?}: {}",
                    network.id, prefix, e
                )));
            }
        }
        Ok(())
    }

    /// Networks in declaration order. Only valid after [`Config::validate`].
    pub fn networks(&self) -> Vec<Network> {
        self.networks
            .iter()
            .map(|n| {
                let prefixes = n.prefixes.iter().filter_map(|p| p.parse().ok()).collect();
                let network = Network::new(n.id.as_str(), n.project.as_str(), prefixes)
                    .with_shared(n.shared);
                match &n.parent_network {
                    Some(parent) => network.with_parent(parent.as_str()),
                    None => network,
                }
            })
            .collect()
    }

    pub fn projects(&self) -> Vec<Project> {
        self.projects.iter().map(|p| Project::new(p.id.as_str())).collect()
    }

    pub fn repository_options(&self) -> RepositoryOptions {
        RepositoryOptions {
            release_on_persist_failure: self.general.release_on_persist_failure,
        }
    }
}
