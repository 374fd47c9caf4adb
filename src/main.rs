use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use env_logger::Env;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ipledger::api;
use ipledger::backend::memory::{
    MemoryAllocator, MemoryNetworks, MemoryProjects, MemoryStore, PrefixAllocations, StoreSnapshot,
};
use ipledger::config::Config;
use ipledger::config_loader;
use ipledger::context::RequestContext;
use ipledger::ip::Backends;
use ipledger::service::{AdminIpService, IpService};

/// Manage IP address records of a multi-tenant cluster
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration YAML file
    #[arg(short, long)]
    config: PathBuf,

    /// State file holding records and allocations between runs
    #[arg(short, long)]
    state: Option<PathBuf>,

    /// Project to act in; omit for administrative listing
    #[arg(short, long)]
    project: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Allocate an address
    Create {
        /// Network to allocate from
        #[arg(short, long)]
        network: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Allocate this exact address
        #[arg(long, conflicts_with = "family")]
        ip: Option<String>,
        /// Bind the address to a machine
        #[arg(long)]
        machine_id: Option<String>,
        #[arg(long = "type", value_enum)]
        ip_type: Option<IpTypeArg>,
        #[arg(long, value_enum)]
        family: Option<FamilyArg>,
        /// Tag as key=value, may be repeated
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Change name, description, type or tags of an address
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long = "type", value_enum)]
        ip_type: Option<IpTypeArg>,
        /// Replace all tags, may be repeated
        #[arg(long = "tag")]
        tags: Option<Vec<String>>,
        /// Remove all tags
        #[arg(long, conflicts_with = "tags")]
        clear_tags: bool,
    },
    /// Release an address and remove its record
    Delete { id: String },
    /// Show an address
    Get { id: String },
    /// List addresses
    List {
        #[arg(short, long)]
        network: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        ip: Option<String>,
        #[arg(long)]
        machine_id: Option<String>,
        #[arg(long = "type", value_enum)]
        ip_type: Option<IpTypeArg>,
        #[arg(long, value_enum)]
        family: Option<FamilyArg>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum IpTypeArg {
    Ephemeral,
    Static,
}

impl From<IpTypeArg> for api::IpType {
    fn from(t: IpTypeArg) -> Self {
        match t {
            IpTypeArg::Ephemeral => api::IpType::Ephemeral,
            IpTypeArg::Static => api::IpType::Static,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FamilyArg {
    V4,
    V6,
}

impl From<FamilyArg> for api::IpAddressFamily {
    fn from(f: FamilyArg) -> Self {
        match f {
            FamilyArg::V4 => api::IpAddressFamily::V4,
            FamilyArg::V6 => api::IpAddressFamily::V6,
        }
    }
}

/// Everything the in-memory backends hold between runs
#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    store: StoreSnapshot,
    allocations: Vec<PrefixAllocations>,
}

fn load_state(path: &Path) -> Result<State> {
    if !path.exists() {
        info!("State file {:?} does not exist, starting empty", path);
        return Ok(State::default());
    }
    let content = fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read state file '{}'", path.display()))?;
    serde_json::from_str(&content)
        .wrap_err_with(|| format!("Failed to parse state file '{}'", path.display()))
}

fn save_state(path: &Path, state: &State) -> Result<()> {
    let content = serde_json::to_string_pretty(state)?;
    fs::write(path, content)
        .wrap_err_with(|| format!("Failed to write state file '{}'", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn config_summary(path: &Path, config: &Config) -> String {
    format!(
        "Loaded configuration {:?}: {} projects, {} networks, request timeout {:?}",
        path,
        config.projects.len(),
        config.networks.len(),
        config.general.request_timeout
    )
}

fn project_of(args: &Args) -> Result<String> {
    args.project
        .clone()
        .ok_or_else(|| eyre!("--project is required for this command"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    let config = config_loader::load_config(&args.config)?;

    // the log level comes from the configuration, so the loader's own lines
    // precede the logger and are summarized here
    let filter = Env::default().default_filter_or(config.general.log_level.as_str());
    env_logger::Builder::from_env(filter).init();
    info!("{}", config_summary(&args.config, &config));

    let state_path = args
        .state
        .clone()
        .or_else(|| config.general.state_file.clone())
        .ok_or_else(|| eyre!("no state file given on the command line or in the configuration"))?;
    let state = load_state(&state_path)?;

    let store = Arc::new(MemoryStore::from_snapshot(state.store));
    let allocator = Arc::new(MemoryAllocator::new());
    allocator.restore(state.allocations);

    let backends = Backends {
        store: store.clone(),
        allocator: allocator.clone(),
        networks: Arc::new(MemoryNetworks::new(config.networks())),
        projects: Arc::new(MemoryProjects::new(config.projects())),
    };
    let service = IpService::new(backends.clone(), config.repository_options());
    let ctx = RequestContext::with_timeout(config.general.request_timeout);

    match &args.command {
        Command::Create {
            network,
            name,
            description,
            ip,
            machine_id,
            ip_type,
            family,
            tags,
        } => {
            let req = api::IpCreateRequest {
                project: project_of(&args)?,
                network: network.clone(),
                name: name.clone(),
                description: description.clone(),
                ip: ip.clone(),
                machine_id: machine_id.clone(),
                ip_type: ip_type.map(Into::into),
                address_family: family.map(Into::into),
                tags: tags.clone(),
            };
            print_json(&service.create(&ctx, &req).await?)?;
        }
        Command::Update {
            id,
            name,
            description,
            ip_type,
            tags,
            clear_tags,
        } => {
            let tags = if *clear_tags { Some(Vec::new()) } else { tags.clone() };
            let req = api::IpUpdateRequest {
                ip: id.clone(),
                project: project_of(&args)?,
                name: name.clone(),
                description: description.clone(),
                ip_type: ip_type.map(Into::into),
                tags,
            };
            print_json(&service.update(&ctx, &req).await?)?;
        }
        Command::Delete { id } => {
            let req = api::IpDeleteRequest {
                ip: id.clone(),
                project: project_of(&args)?,
            };
            print_json(&service.delete(&ctx, &req).await?)?;
        }
        Command::Get { id } => {
            let req = api::IpGetRequest {
                ip: id.clone(),
                project: project_of(&args)?,
            };
            print_json(&service.get(&ctx, &req).await?)?;
        }
        Command::List {
            network,
            name,
            ip,
            machine_id,
            ip_type,
            family,
            tags,
        } => {
            let req = api::IpListRequest {
                ip: ip.clone(),
                network: network.clone(),
                project: args.project.clone(),
                name: name.clone(),
                machine_id: machine_id.clone(),
                tags: tags.clone(),
                ip_type: ip_type.map(Into::into),
                address_family: family.map(Into::into),
                ..Default::default()
            };
            let ips = match &args.project {
                Some(_) => service.list(&ctx, &req).await?,
                None => AdminIpService::new(backends).list(&ctx, &req).await?,
            };
            print_json(&ips)?;
        }
    }

    save_state(
        &state_path,
        &State {
            store: store.snapshot(),
            allocations: allocator.snapshot(),
        },
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from([
            "ipledger",
            "--config",
            "ipledger.yaml",
            "--project",
            "p1",
            "create",
            "--network",
            "n1",
            "--family",
            "v6",
            "--tag",
            "env=prod",
            "--tag",
            "team=net",
        ]);

        assert_eq!(args.config, PathBuf::from("ipledger.yaml"));
        assert_eq!(args.project.as_deref(), Some("p1"));
        match args.command {
            Command::Create { network, family, tags, ip, .. } => {
                assert_eq!(network, "n1");
                assert_eq!(family, Some(FamilyArg::V6));
                assert_eq!(tags, vec!["env=prod", "team=net"]);
                assert_eq!(ip, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_specific_ip_conflicts_with_family() {
        let res = Args::try_parse_from([
            "ipledger",
            "--config",
            "ipledger.yaml",
            "create",
            "--network",
            "n1",
            "--ip",
            "10.0.0.1",
            "--family",
            "v4",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn test_update_tags_absent_vs_given() {
        let args = Args::parse_from(["ipledger", "-c", "x.yaml", "update", "7", "--name", "web"]);
        match args.command {
            Command::Update { id, tags, clear_tags, .. } => {
                assert_eq!(id, "7");
                assert_eq!(tags, None);
                assert!(!clear_tags);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_config_summary() {
        let config: Config = serde_yaml::from_str(
            r#"
general:
  request_timeout: "3s"
projects:
  - id: "p1"
networks:
  - id: "n1"
    project: "p1"
    prefixes: ["10.0.0.0/24"]
  - id: "n2"
    project: "p1"
    prefixes: ["10.1.0.0/24"]
"#,
        )
        .unwrap();

        let summary = config_summary(Path::new("ipledger.yaml"), &config);
        assert_eq!(
            summary,
            "Loaded configuration \"ipledger.yaml\": 1 projects, 2 networks, request timeout 3s"
        );
    }

    #[test]
    fn test_state_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let empty = load_state(&path).unwrap();
        assert!(empty.store.records.is_empty());

        let state = State {
            store: StoreSnapshot {
                next_id: 4,
                records: Vec::new(),
            },
            allocations: vec![PrefixAllocations {
                prefix: "10.0.0.0/24".parse().unwrap(),
                addresses: vec!["10.0.0.3".parse().unwrap()],
            }],
        };
        save_state(&path, &state).unwrap();

        let loaded = load_state(&path).unwrap();
        assert_eq!(loaded.store, state.store);
        assert_eq!(loaded.allocations, state.allocations);
    }
}
