//! Command-line interface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use swarmkick_rebalance::{RebalanceController, SwarmPlatform};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::output::{self, OutputFormat};

/// Move one replica of a swarm service onto the least loaded node.
///
/// Scales the service up by one, waits for the new replica to run, kills the
/// oldest container and scales back down. When nothing of the service is
/// running, lists the swarm nodes instead and changes nothing.
#[derive(Debug, Parser)]
#[command(name = "swarmkick")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Name of the service to rebalance.
    service: String,

    /// Manager engine endpoint (unix:///path, tcp://host:port, http(s)://host:port).
    #[arg(long, env = "SWARMKICK_DOCKER_HOST")]
    docker_host: Option<String>,

    /// Count containers on every swarm node, not just the manager endpoint.
    #[arg(long, env = "SWARMKICK_CLUSTER")]
    cluster: bool,

    /// Engine port on each node for cluster census and kills.
    #[arg(long, env = "SWARMKICK_NODE_PORT")]
    node_port: Option<u16>,

    /// Seconds between checks for the new replica.
    #[arg(long, env = "SWARMKICK_POLL_INTERVAL", value_name = "SECS")]
    poll_interval: Option<u64>,

    /// Seconds to wait for the new replica before giving up.
    #[arg(long, env = "SWARMKICK_TIMEOUT", value_name = "SECS")]
    timeout: Option<u64>,

    /// Give up after this many checks for the new replica.
    #[arg(long, env = "SWARMKICK_MAX_POLLS")]
    max_polls: Option<u32>,

    /// Seconds before a single engine request fails.
    #[arg(long, env = "SWARMKICK_REQUEST_TIMEOUT", value_name = "SECS")]
    request_timeout: Option<u64>,

    /// Continue when some nodes cannot be queried during a cluster census.
    #[arg(long, env = "SWARMKICK_ALLOW_PARTIAL_CENSUS")]
    allow_partial_census: bool,

    /// Leave the service over-provisioned if a step after the scale-up fails.
    #[arg(long, env = "SWARMKICK_NO_COMPENSATE")]
    no_compensate: bool,

    /// Engine API version prefix, e.g. 1.43.
    #[arg(long, env = "SWARMKICK_API_VERSION")]
    api_version: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Config file (default: config.json in the platform config directory).
    #[arg(long, env = "SWARMKICK_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Run one rebalance.
    pub async fn run(self) -> Result<()> {
        let config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };
        let config = self.apply(config);
        config.validate()?;

        let platform =
            SwarmPlatform::new(config.endpoint()?, config.client_options(), config.node_port)?;
        info!(
            docker_host = %platform.endpoint(),
            cluster = config.cluster,
            poll_interval_secs = config.poll_interval_secs,
            timeout_secs = config.timeout_secs,
            "Configuration loaded"
        );

        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("Interrupt received, stopping at the next step; interrupt again to exit now");
            let _ = cancel_tx.send(true);

            if tokio::signal::ctrl_c().await.is_ok() {
                error!("Second interrupt, exiting; the service may be over-provisioned");
                std::process::exit(130);
            }
        });

        let controller = RebalanceController::new(Arc::new(platform), config.rebalance_config())
            .with_cancellation(cancel_rx);

        let outcome = controller.run(&self.service).await?;
        output::print_outcome(&outcome, self.format);

        Ok(())
    }

    /// Overlay flags onto `config`.
    fn apply(&self, mut config: Config) -> Config {
        if let Some(host) = &self.docker_host {
            config.docker_host = host.clone();
        }
        if let Some(port) = self.node_port {
            config.node_port = port;
        }
        if let Some(secs) = self.poll_interval {
            config.poll_interval_secs = secs;
        }
        if let Some(secs) = self.timeout {
            config.timeout_secs = secs;
        }
        if self.max_polls.is_some() {
            config.max_polls = self.max_polls;
        }
        if let Some(secs) = self.request_timeout {
            config.request_timeout_secs = secs;
        }
        if self.api_version.is_some() {
            config.api_version = self.api_version.clone();
        }
        config.cluster |= self.cluster;
        config.allow_partial_census |= self.allow_partial_census;
        config.compensate &= !self.no_compensate;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            docker_host: "unix:///var/run/docker.sock".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "swarmkick",
            "web",
            "--docker-host",
            "tcp://10.0.0.1:2375",
            "--poll-interval",
            "2",
            "--max-polls",
            "30",
            "--cluster",
            "--no-compensate",
        ])
        .unwrap();

        let config = cli.apply(config());

        assert_eq!(cli.service, "web");
        assert_eq!(config.docker_host, "tcp://10.0.0.1:2375");
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.max_polls, Some(30));
        assert_eq!(config.timeout_secs, 600);
        assert!(config.cluster);
        assert!(!config.compensate);
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let cli = Cli::try_parse_from(["swarmkick", "web", "--format", "json"]).unwrap();
        let base = Config {
            cluster: true,
            node_port: 2376,
            ..config()
        };

        let config = cli.apply(base.clone());

        assert_eq!(config, base);
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn test_service_is_required() {
        assert!(Cli::try_parse_from(["swarmkick"]).is_err());
    }
}
