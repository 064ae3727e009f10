//! Configuration file.
//!
//! Lowest layer of the settings: built-in defaults, overlaid by an optional
//! JSON file. Command-line flags are applied on top by `cli`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use swarmkick_engine::{ClientOptions, Endpoint, DEFAULT_NODE_PORT, DEFAULT_SOCKET};
use swarmkick_rebalance::{CensusPolicy, CensusScope, RebalanceConfig};

/// Configuration file name.
const CONFIG_FILE: &str = "config.json";

/// Get the config directory path.
fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("com", "swarmkick", "swarmkick")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

/// Settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Manager engine endpoint.
    pub docker_host: String,

    /// Census every swarm node instead of only the manager endpoint.
    pub cluster: bool,

    /// Engine port on each node for cluster census and kills.
    pub node_port: u16,

    pub poll_interval_secs: u64,
    pub timeout_secs: u64,
    pub max_polls: Option<u32>,
    pub request_timeout_secs: u64,
    pub allow_partial_census: bool,

    /// Restore the replica count when a step after the scale-up fails.
    pub compensate: bool,

    /// Engine API version, e.g. "1.43".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

fn default_docker_host() -> String {
    std::env::var("DOCKER_HOST")
        .ok()
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| format!("unix://{DEFAULT_SOCKET}"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker_host: default_docker_host(),
            cluster: false,
            node_port: DEFAULT_NODE_PORT,
            poll_interval_secs: 5,
            timeout_secs: 600,
            max_polls: None,
            request_timeout_secs: 30,
            allow_partial_census: false,
            compensate: true,
            api_version: None,
        }
    }
}

impl Config {
    /// Load config from the platform config directory, or return defaults.
    pub fn load() -> Result<Self> {
        let path = config_dir()?.join(CONFIG_FILE);

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load config from `path`. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))
    }

    /// Reject settings that cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            bail!("poll interval must be at least 1 second");
        }
        if self.timeout_secs == 0 {
            bail!("convergence timeout must be at least 1 second");
        }
        if self.request_timeout_secs == 0 {
            bail!("request timeout must be at least 1 second");
        }
        if self.max_polls == Some(0) {
            bail!("max polls must be at least 1");
        }
        Ok(())
    }

    /// Parsed manager endpoint.
    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.docker_host)
            .with_context(|| format!("Invalid docker host '{}'", self.docker_host))
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_secs(self.request_timeout_secs),
            api_version: self.api_version.clone(),
        }
    }

    pub fn rebalance_config(&self) -> RebalanceConfig {
        RebalanceConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            convergence_timeout: Duration::from_secs(self.timeout_secs),
            max_polls: self.max_polls,
            scope: if self.cluster {
                CensusScope::Cluster
            } else {
                CensusScope::Local
            },
            policy: if self.allow_partial_census {
                CensusPolicy::AllowPartial
            } else {
                CensusPolicy::Strict
            },
            compensate: self.compensate,
        }
    }
}
