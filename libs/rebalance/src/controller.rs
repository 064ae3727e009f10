//! Rebalance controller.
//!
//! Drives one rebalance of one service through
//! `Start -> Counted -> ScaledUp -> Converged -> Culled -> ScaledDown -> Done`,
//! or ends in `NoOpDiagnostic` when nothing of the service is running.
//! Steps never overlap: each one completes before the next starts.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::census::{self, CensusPolicy, CensusScope};
use crate::error::{RebalanceError, Result};
use crate::inventory;
use crate::model::{ContainerInstance, Node, Service};
use crate::platform::Orchestrator;
use crate::scale::scale;

/// Default interval between convergence polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default bound on waiting for the new replica.
pub const DEFAULT_CONVERGENCE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Rebalance configuration.
#[derive(Debug, Clone)]
pub struct RebalanceConfig {
    /// Interval between convergence polls.
    pub poll_interval: Duration,

    /// Give up waiting for the new replica after this long.
    pub convergence_timeout: Duration,

    /// Give up after this many polls, if set.
    pub max_polls: Option<u32>,

    /// Hosts the census queries.
    pub scope: CensusScope,

    /// How census host failures surface.
    pub policy: CensusPolicy,

    /// Restore the original replica count when a step after the scale-up fails.
    pub compensate: bool,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            convergence_timeout: DEFAULT_CONVERGENCE_TIMEOUT,
            max_polls: None,
            scope: CensusScope::Local,
            policy: CensusPolicy::Strict,
            compensate: true,
        }
    }
}

/// Rebalance state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Start,
    Counted,
    ScaledUp,
    Converged,
    Culled,
    ScaledDown,
    Done,
    NoOpDiagnostic,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::Counted => "counted",
            Self::ScaledUp => "scaled_up",
            Self::Converged => "converged",
            Self::Culled => "culled",
            Self::ScaledDown => "scaled_down",
            Self::Done => "done",
            Self::NoOpDiagnostic => "no_op_diagnostic",
        };
        f.write_str(s)
    }
}

/// Summary of a completed rebalance.
#[derive(Debug, Clone, Serialize)]
pub struct RebalanceReport {
    pub service: String,

    /// Replica count before and after.
    pub replicas: u64,

    /// Running instances before the scale-up.
    pub baseline_running: usize,

    /// Running instances observed when the new replica came up.
    pub converged_running: usize,

    pub polls: u32,
    pub terminated: ContainerInstance,

    /// Version token after the scale-down.
    pub final_version: u64,
}

/// What the diagnostic path found.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub service: String,
    pub replicas: Option<u64>,
    pub nodes: Vec<Node>,
}

/// Terminal result of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// `Done`: one instance was kicked.
    Rebalanced(RebalanceReport),

    /// `NoOpDiagnostic`: nothing was running, nothing was changed.
    NoRunningInstances(DiagnosticReport),
}

/// Runs rebalances against an orchestrator.
pub struct RebalanceController {
    platform: Arc<dyn Orchestrator>,
    config: RebalanceConfig,
    cancel: Option<watch::Receiver<bool>>,
}

impl RebalanceController {
    /// Create a controller.
    pub fn new(platform: Arc<dyn Orchestrator>, config: RebalanceConfig) -> Self {
        Self {
            platform,
            config,
            cancel: None,
        }
    }

    /// Stop waiting for convergence once `true` is sent on the channel.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Find a service by exact name.
    pub async fn resolve_service(&self, name: &str) -> Result<Service> {
        let services = self.platform.list_services().await?;
        services
            .into_iter()
            .find(|service| service.name == name)
            .ok_or_else(|| RebalanceError::NotFound(name.to_string()))
    }

    /// Rebalance one instance of the named service.
    #[instrument(skip(self), fields(scope = ?self.config.scope))]
    pub async fn run(&self, service_name: &str) -> Result<Outcome> {
        let service = self.resolve_service(service_name).await?;
        info!(
            service = %service.name,
            service_id = %service.id,
            image = %service.image(),
            replicas = ?service.replicas(),
            phase = %Phase::Start,
            "Balancing service"
        );

        let baseline = self.running_instances(&service).await?;
        let running_count = baseline.len();
        info!(
            service = %service.name,
            phase = %Phase::Counted,
            running = running_count,
            "Counted running instances"
        );

        // The victim comes from the pre-scale-up baseline so the replica
        // about to be created can never be chosen.
        let Some(victim) = census::oldest(&baseline).cloned() else {
            return self.diagnose(&service).await;
        };

        let original = service
            .replicas()
            .ok_or_else(|| RebalanceError::NotReplicated(service.name.clone()))?;

        if self.cancelled() {
            return Err(RebalanceError::Cancelled {
                service: service.name.clone(),
            });
        }

        let scaled = match scale(self.platform.as_ref(), &service, original + 1).await {
            Ok(scaled) => scaled,
            // The update may have been applied even though no answer came back.
            Err(e @ RebalanceError::Connectivity { .. }) => {
                return Err(self.abort(Phase::Counted, &service, original, e).await);
            }
            Err(e) => return Err(e),
        };
        info!(
            service = %service.name,
            phase = %Phase::ScaledUp,
            replicas = original + 1,
            "Scaled up"
        );

        let converged = self.await_convergence(&scaled, running_count).await;
        let (converged_running, polls) = match converged {
            Ok(converged) => converged,
            Err(e) => return Err(self.abort(Phase::ScaledUp, &scaled, original, e).await),
        };
        info!(
            service = %service.name,
            phase = %Phase::Converged,
            running = converged_running,
            polls,
            "New replica running"
        );

        if self.cancelled() {
            let e = RebalanceError::Cancelled {
                service: service.name.clone(),
            };
            return Err(self.abort(Phase::Converged, &scaled, original, e).await);
        }

        if let Err(e) = self.cull(&victim).await {
            return Err(self.abort(Phase::Converged, &scaled, original, e).await);
        }
        info!(
            service = %service.name,
            phase = %Phase::Culled,
            container = %victim.id,
            host = %victim.host,
            created = %victim.created,
            "Terminated oldest instance"
        );

        let restored = match self.scale_down(&scaled, original).await {
            Ok(restored) => restored,
            Err(e) => return Err(self.abort(Phase::Culled, &scaled, original, e).await),
        };
        info!(
            service = %service.name,
            phase = %Phase::ScaledDown,
            replicas = original,
            "Scaled down"
        );

        if restored.replicas() != Some(original) {
            warn!(
                service = %service.name,
                expected = original,
                observed = ?restored.replicas(),
                "Replica count changed by another actor during rebalance"
            );
        }

        info!(service = %service.name, phase = %Phase::Done, "Rebalance complete");
        Ok(Outcome::Rebalanced(RebalanceReport {
            service: service.name,
            replicas: original,
            baseline_running: running_count,
            converged_running,
            polls,
            terminated: victim,
            final_version: restored.version,
        }))
    }

    /// Census filtered to running instances, with the policy applied.
    async fn running_instances(&self, service: &Service) -> Result<Vec<ContainerInstance>> {
        let report = census::census(self.platform.as_ref(), service, self.config.scope).await?;
        if !report.is_complete() {
            debug!(
                service = %service.name,
                failed = report.failures.len(),
                queried = report.hosts_queried,
                "Census incomplete"
            );
        }
        let instances = report.resolve(self.config.policy)?;
        Ok(census::running(&instances))
    }

    /// Read-only branch for a service with nothing running.
    async fn diagnose(&self, service: &Service) -> Result<Outcome> {
        warn!(
            service = %service.name,
            phase = %Phase::NoOpDiagnostic,
            "No containers running for service"
        );

        let nodes = inventory::list_nodes(self.platform.as_ref()).await?;
        inventory::log_nodes(&nodes);

        Ok(Outcome::NoRunningInstances(DiagnosticReport {
            service: service.name.clone(),
            replicas: service.replicas(),
            nodes,
        }))
    }

    /// Poll until more instances run than in the baseline.
    async fn await_convergence(&self, service: &Service, baseline: usize) -> Result<(usize, u32)> {
        let started = Instant::now();
        let mut cancel = self.cancel.clone();
        let mut polls: u32 = 0;

        loop {
            if self.cancelled() {
                return Err(RebalanceError::Cancelled {
                    service: service.name.clone(),
                });
            }

            polls += 1;
            let running = self.running_instances(service).await?.len();
            debug!(
                service = %service.name,
                polls,
                running,
                baseline,
                "Waiting for the new replica"
            );

            if running > baseline {
                return Ok((running, polls));
            }

            let elapsed = started.elapsed();
            let polls_exhausted = self.config.max_polls.is_some_and(|max| polls >= max);
            if polls_exhausted || elapsed >= self.config.convergence_timeout {
                return Err(RebalanceError::Timeout {
                    service: service.name.clone(),
                    elapsed,
                    polls,
                });
            }

            let pause = self
                .config
                .poll_interval
                .min(self.config.convergence_timeout - elapsed);
            if sleep_or_cancel(pause, cancel.as_mut()).await {
                return Err(RebalanceError::Cancelled {
                    service: service.name.clone(),
                });
            }
        }
    }

    async fn cull(&self, victim: &ContainerInstance) -> Result<()> {
        self.platform
            .kill_container(&victim.host, &victim.id)
            .await
            .map_err(|e| RebalanceError::Termination {
                container: victim.id.clone(),
                host: victim.host.to_string(),
                message: e.to_string(),
            })
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    async fn refetch(&self, service: &Service) -> Result<Service> {
        let current = self
            .platform
            .inspect_service(&service.id)
            .await
            .map_err(|e| RebalanceError::from_platform(e, service))?;
        debug!(service = %service.name, version = current.version, "Re-fetched service");
        Ok(current)
    }

    /// Re-fetch for a fresh version token, then scale to `replicas`.
    async fn scale_down(&self, service: &Service, replicas: u64) -> Result<Service> {
        let current = self.refetch(service).await?;
        scale(self.platform.as_ref(), &current, replicas).await
    }

    /// Return the service to `replicas`. No update is sent if it is already there.
    async fn restore(&self, service: &Service, replicas: u64) -> Result<()> {
        let current = self.refetch(service).await?;
        if current.replicas() == Some(replicas) {
            debug!(service = %service.name, replicas, "Replica count already at original");
            return Ok(());
        }
        scale(self.platform.as_ref(), &current, replicas).await?;
        Ok(())
    }

    /// Wrap a post-scale-up failure, restoring the replica count if enabled.
    async fn abort(
        &self,
        phase: Phase,
        service: &Service,
        original: u64,
        err: RebalanceError,
    ) -> RebalanceError {
        error!(service = %service.name, %phase, error = %err, "Rebalance failed after scale-up");

        let compensated = if self.config.compensate {
            match self.restore(service, original).await {
                Ok(()) => {
                    info!(
                        service = %service.name,
                        replicas = original,
                        "Restored original replica count"
                    );
                    true
                }
                Err(restore_err) => {
                    error!(
                        service = %service.name,
                        replicas = original,
                        error = %restore_err,
                        "Failed to restore replica count; service may be over-provisioned"
                    );
                    false
                }
            }
        } else {
            error!(
                service = %service.name,
                replicas = original + 1,
                "Compensation disabled; service left over-provisioned"
            );
            false
        };

        RebalanceError::Aborted {
            service: service.name.clone(),
            replicas: original,
            phase,
            compensated,
            source: Box::new(err),
        }
    }
}

/// Sleep for `duration`; returns true if cancellation arrived first.
async fn sleep_or_cancel(duration: Duration, cancel: Option<&mut watch::Receiver<bool>>) -> bool {
    let Some(rx) = cancel else {
        tokio::time::sleep(duration).await;
        return false;
    };

    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = rx.changed() => match changed {
                Ok(()) if *rx.borrow() => return true,
                Ok(()) => continue,
                Err(_) => {
                    // Sender gone: nobody can cancel any more.
                    (&mut sleep).await;
                    return false;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = RebalanceConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.convergence_timeout, Duration::from_secs(600));
        assert_eq!(config.scope, CensusScope::Local);
        assert_eq!(config.policy, CensusPolicy::Strict);
        assert!(config.compensate);
    }

    #[tokio::test]
    async fn test_sleep_or_cancel() {
        assert!(!sleep_or_cancel(Duration::from_millis(10), None).await);

        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        assert!(sleep_or_cancel(Duration::from_secs(30), Some(&mut rx)).await);

        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        assert!(!sleep_or_cancel(Duration::from_millis(10), Some(&mut rx)).await);
    }
}
