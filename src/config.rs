// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use {
    log::{info, warn},
    nix::unistd::{access, AccessFlags},
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

use crate::{fleet::ssh::DEFAULT_SSH_OPTIONS, store::ConfigStore, validator::Validator};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not open config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("could not parse config file '{path}': {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid nodeset: {0}")]
    Nodeset(String),

    #[error("no nodes configured")]
    NoNodes,
}

/// Features of keepalived in use on this cluster. They are reported at startup; the template
/// engine itself handles both the same way.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Vrrp,
    Lvs,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Mode::Vrrp => "VRRP",
                Mode::Lvs => "LVS",
            }
        )
    }
}

/// How fleet commands reach the other nodes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// One ssh connection per node, with real exit codes.
    Ssh,
    /// ClusterShell, with exit codes recovered from a sentinel line.
    Clush,
}

impl Transport {
    pub fn program(&self) -> &'static str {
        match self {
            Transport::Ssh => "ssh",
            Transport::Clush => "clush",
        }
    }
}

/// The kafleet configuration file.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Directory holding the master template, the per-node files and the archive.
    pub config_dir: String,
    pub master_basename: String,
    /// Where each node's derived file is copied to when it is activated.
    pub live_config_file: String,
    pub modes: Vec<Mode>,
    /// Nodesets making up the cluster, e.g. `["lb[01-03]", "lb10"]`.
    pub nodes: Vec<String>,
    /// External syntax checker, run with the file to check as its only argument.
    pub validator: Option<String>,
    /// Commit at the end of an edit session without asking.
    pub auto_commit: bool,
    pub fleet: FleetConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct FleetConfig {
    pub transport: Transport,
    pub ssh_options: Vec<String>,
    /// Upper bound on each of the push, activate and reload stages.
    pub stage_timeout_secs: u64,
    /// Run on every node to pull the shared config directory from `{origin}`.
    pub push_command: String,
    /// Run on every node to install `{node_config}` as `{live_config}`.
    pub activate_command: String,
    pub reload_command: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            config_dir: "/etc/keepalived/master".to_string(),
            master_basename: "keepalived.conf".to_string(),
            live_config_file: "/etc/keepalived/keepalived.conf".to_string(),
            modes: vec![Mode::Vrrp],
            nodes: Vec::new(),
            validator: None,
            auto_commit: false,
            fleet: FleetConfig::default(),
        }
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        FleetConfig {
            transport: Transport::Ssh,
            ssh_options: DEFAULT_SSH_OPTIONS.iter().map(|o| o.to_string()).collect(),
            stage_timeout_secs: 120,
            push_command: "rsync -a --exclude archive --exclude '.*' {origin}:{config_dir}/ {config_dir}/"
                .to_string(),
            activate_command: "cp {node_config} {live_config}".to_string(),
            reload_command: "systemctl reload keepalived".to_string(),
        }
    }
}

impl FleetConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// The cluster nodes, deduplicated, in nodeset order.
    pub fn nodeset(&self) -> Result<Vec<String>, ConfigError> {
        let nodes =
            nodesets2hostnames(&self.nodes).map_err(|e| ConfigError::Nodeset(e.to_string()))?;
        if nodes.is_empty() {
            return Err(ConfigError::NoNodes);
        }
        Ok(nodes)
    }

    pub fn store(&self) -> ConfigStore {
        ConfigStore::new(&self.config_dir, &self.master_basename)
    }

    pub fn validator(&self) -> Option<Validator> {
        self.validator.as_ref().map(Validator::new)
    }

    pub fn has_mode(&self, mode: Mode) -> bool {
        self.modes.contains(&mode)
    }
}

/// Convert multiple nodeset strings into a single, deduplicated NodeSet object.
/// A "nodeset" is a string representing shorthand notation for a group of hosts (e.g.,
/// 'lb[01-05]').
fn merge_nodesets(nodesets: &[String]) -> Result<nodeset::NodeSet, nodeset::NodeSetParseError> {
    let mut nodeset = nodeset::NodeSet::new();
    for nodeset_str in nodesets.iter() {
        let curr_nodeset = &nodeset_str.parse()?;
        nodeset = nodeset.union(curr_nodeset);
    }
    Ok(nodeset)
}

/// Convert multiple nodesets into a vector of hostname strings.
pub fn nodesets2hostnames(nodesets: &[String]) -> Result<Vec<String>, nodeset::NodeSetParseError> {
    Ok(merge_nodesets(nodesets)?.iter().collect())
}

/// What this process is able to do, determined once at startup.
///
/// Problems found here are logged and lower the corresponding flag instead of aborting, so that
/// read-only commands keep working on a node that cannot commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Capabilities {
    pub vrrp: bool,
    pub lvs: bool,
    pub config_dir_writable: bool,
    pub live_config_writable: bool,
    pub validator: bool,
    pub fleet: bool,
}

impl Capabilities {
    pub fn probe(config: &Config) -> Self {
        let vrrp = config.has_mode(Mode::Vrrp);
        let lvs = config.has_mode(Mode::Lvs);
        for mode in &config.modes {
            info!("started with {mode} support");
        }

        let config_dir_writable = is_writable(Path::new(&config.config_dir));
        if !config_dir_writable {
            warn!(
                "current user cannot write in config dir {}",
                config.config_dir
            );
        }

        let live_config_writable = is_writable(Path::new(&config.live_config_file));
        if !live_config_writable {
            warn!(
                "current user cannot write the live config file {}",
                config.live_config_file
            );
        }

        let validator = match config.validator() {
            Some(v) if v.is_available() => true,
            Some(v) => {
                warn!("validator {} does not exist", v.program().display());
                false
            }
            None => {
                warn!("no validator configured");
                false
            }
        };

        let fleet = find_in_path(config.fleet.transport.program()).is_some();
        if !fleet {
            warn!(
                "'{}' not found in PATH, fleet operations are unavailable",
                config.fleet.transport.program()
            );
        }

        Capabilities {
            vrrp,
            lvs,
            config_dir_writable,
            live_config_writable,
            validator,
            fleet,
        }
    }

    /// Whether every precondition of a commit holds.
    pub fn can_commit(&self) -> bool {
        self.config_dir_writable && self.validator && self.fleet
    }
}

/// A path is writable if it exists and can be written to, or if it does not exist yet and its
/// parent directory can be written to.
fn is_writable(path: &Path) -> bool {
    if path.exists() {
        return access(path, AccessFlags::W_OK).is_ok();
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            access(parent, AccessFlags::W_OK).is_ok()
        }
        _ => access(".", AccessFlags::W_OK).is_ok(),
    }
}

fn find_in_path(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
