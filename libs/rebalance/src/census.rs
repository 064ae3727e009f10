//! Container census.
//!
//! Enumerates the containers of one service across hosts. The census only
//! observes; it never changes what it finds.

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::error::{RebalanceError, Result};
use crate::inventory;
use crate::model::{ContainerInstance, HostTarget, Service};
use crate::platform::{Orchestrator, PlatformError};

/// Which hosts a census queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CensusScope {
    /// Only the configured engine endpoint.
    #[default]
    Local,

    /// Every swarm node, each over its own connection.
    Cluster,
}

/// How host failures surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CensusPolicy {
    /// Any failed host fails the census.
    #[default]
    Strict,

    /// Use the hosts that answered; fail only if none did.
    AllowPartial,
}

/// A host whose container listing failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFailure {
    pub host: HostTarget,
    pub error: PlatformError,
}

/// Outcome of one census pass.
#[derive(Debug, Clone, Default)]
pub struct CensusReport {
    /// Matching containers from hosts that answered, in host order.
    pub instances: Vec<ContainerInstance>,

    /// Hosts that did not answer.
    pub failures: Vec<HostFailure>,

    /// Number of hosts the census tried.
    pub hosts_queried: usize,
}

impl CensusReport {
    /// Every queried host answered.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Apply `policy` and return the instances it admits.
    pub fn resolve(self, policy: CensusPolicy) -> Result<Vec<ContainerInstance>> {
        if self.failures.is_empty() {
            return Ok(self.instances);
        }

        let all_failed = self.failures.len() >= self.hosts_queried;
        if policy == CensusPolicy::AllowPartial && !all_failed {
            for failure in &self.failures {
                warn!(
                    host = %failure.host,
                    error = %failure.error,
                    "Census continuing without host"
                );
            }
            return Ok(self.instances);
        }

        let target = self
            .failures
            .iter()
            .map(|f| f.host.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let message = self
            .failures
            .iter()
            .map(|f| f.error.to_string())
            .collect::<Vec<_>>()
            .join("; ");

        Err(RebalanceError::Connectivity { target, message })
    }
}

/// Enumerate the containers of `service` across the hosts in `scope`.
///
/// Hosts are queried concurrently and the call returns once every host has
/// answered or failed. Only containers whose image equals the service image
/// are kept.
pub async fn census(
    platform: &dyn Orchestrator,
    service: &Service,
    scope: CensusScope,
) -> Result<CensusReport> {
    let mut report = CensusReport::default();

    let hosts = match scope {
        CensusScope::Local => vec![HostTarget::Local],
        CensusScope::Cluster => {
            let nodes = inventory::list_nodes(platform).await?;
            let mut hosts = Vec::with_capacity(nodes.len());
            for node in nodes {
                match node.addr {
                    Some(addr) => hosts.push(HostTarget::Node { addr }),
                    None => {
                        report.hosts_queried += 1;
                        report.failures.push(HostFailure {
                            host: HostTarget::Node {
                                addr: node.hostname.clone(),
                            },
                            error: PlatformError::Unreachable {
                                target: node.hostname,
                                message: "node reports no address".to_string(),
                            },
                        });
                    }
                }
            }
            hosts
        }
    };

    report.hosts_queried += hosts.len();

    let listings = join_all(hosts.into_iter().map(|host| async move {
        let result = platform.list_containers(&host).await;
        (host, result)
    }))
    .await;

    let image = service.image();
    for (host, result) in listings {
        match result {
            Ok(containers) => {
                let before = report.instances.len();
                report
                    .instances
                    .extend(containers.into_iter().filter(|c| c.image == image));
                debug!(
                    host = %host,
                    service = %service.name,
                    matched = report.instances.len() - before,
                    "Census host listed"
                );
            }
            Err(error) => {
                warn!(host = %host, service = %service.name, error = %error, "Census host failed");
                report.failures.push(HostFailure { host, error });
            }
        }
    }

    Ok(report)
}

/// Running instances, in census order.
pub fn running(instances: &[ContainerInstance]) -> Vec<ContainerInstance> {
    instances.iter().filter(|c| c.is_running()).cloned().collect()
}

/// The oldest instance by creation time.
///
/// Ties go to the later element: engines list newest first, so among equal
/// timestamps the last one listed is the oldest.
pub fn oldest(instances: &[ContainerInstance]) -> Option<&ContainerInstance> {
    instances
        .iter()
        .reduce(|oldest, candidate| {
            if candidate.created <= oldest.created {
                candidate
            } else {
                oldest
            }
        })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::model::RunState;

    fn instance(id: &str, created: i64, state: RunState) -> ContainerInstance {
        ContainerInstance {
            id: id.to_string(),
            name: None,
            image: "nginx:1.25".to_string(),
            state,
            host: HostTarget::Local,
            created: DateTime::<Utc>::from_timestamp(created, 0).unwrap(),
        }
    }

    #[test]
    fn test_oldest_uses_creation_time() {
        let instances = vec![
            instance("c1", 300, RunState::Running),
            instance("c2", 100, RunState::Running),
            instance("c3", 200, RunState::Running),
        ];

        assert_eq!(oldest(&instances).unwrap().id, "c2");
    }

    #[test]
    fn test_oldest_tie_prefers_last_listed() {
        let instances = vec![
            instance("c1", 100, RunState::Running),
            instance("c2", 100, RunState::Running),
            instance("c3", 100, RunState::Running),
        ];

        assert_eq!(oldest(&instances).unwrap().id, "c3");
        assert!(oldest(&[]).is_none());
    }

    #[test]
    fn test_running_preserves_order() {
        let instances = vec![
            instance("c1", 1, RunState::Running),
            instance("c2", 2, RunState::Pending),
            instance("c3", 3, RunState::Running),
            instance("c4", 4, RunState::Stopped),
        ];

        let ids: Vec<_> = running(&instances).into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["c1", "c3"]);
    }

    fn partial_report() -> CensusReport {
        CensusReport {
            instances: vec![instance("c1", 1, RunState::Running)],
            failures: vec![HostFailure {
                host: HostTarget::Node {
                    addr: "10.0.0.9".to_string(),
                },
                error: PlatformError::Unreachable {
                    target: "10.0.0.9".to_string(),
                    message: "connection refused".to_string(),
                },
            }],
            hosts_queried: 2,
        }
    }

    #[test]
    fn test_strict_policy_rejects_partial_report() {
        let err = partial_report().resolve(CensusPolicy::Strict).unwrap_err();
        assert!(
            matches!(err, RebalanceError::Connectivity { ref target, .. } if target == "10.0.0.9")
        );
    }

    #[test]
    fn test_allow_partial_keeps_answering_hosts() {
        let instances = partial_report()
            .resolve(CensusPolicy::AllowPartial)
            .unwrap();
        assert_eq!(instances.len(), 1);

        let mut nothing_answered = partial_report();
        nothing_answered.hosts_queried = 1;
        nothing_answered.instances.clear();
        assert!(nothing_answered.resolve(CensusPolicy::AllowPartial).is_err());
    }
}
