//! `Orchestrator` backed by the Docker Engine API.

use async_trait::async_trait;
use swarmkick_engine::{ClientOptions, EngineClient, EngineError, Endpoint, ServiceSpec};
use tracing::debug;

use crate::model::{ContainerInstance, HostTarget, Node, Service};
use crate::platform::{Orchestrator, PlatformError};

/// Swarm reached through a manager endpoint, with host-scoped connections
/// to individual nodes for container queries.
#[derive(Debug, Clone)]
pub struct SwarmPlatform {
    manager: EngineClient,
    options: ClientOptions,
    node_port: u16,
}

impl SwarmPlatform {
    /// Create a platform for the given manager endpoint.
    pub fn new(
        manager: Endpoint,
        options: ClientOptions,
        node_port: u16,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            manager: EngineClient::new(manager, &options)?,
            options,
            node_port,
        })
    }

    /// Manager endpoint this platform talks to.
    pub fn endpoint(&self) -> &Endpoint {
        self.manager.endpoint()
    }

    fn client_for(&self, host: &HostTarget) -> Result<EngineClient, PlatformError> {
        match host {
            HostTarget::Local => Ok(self.manager.clone()),
            HostTarget::Node { addr } => {
                let endpoint = Endpoint::node(addr, self.node_port);
                debug!(host = %addr, endpoint = %endpoint, "Opening host-scoped connection");
                EngineClient::new(endpoint, &self.options)
                    .map_err(|e| platform_error(&host.to_string(), e))
            }
        }
    }

    fn manager_target(&self) -> String {
        self.manager.endpoint().to_string()
    }
}

#[async_trait]
impl Orchestrator for SwarmPlatform {
    async fn list_services(&self) -> Result<Vec<Service>, PlatformError> {
        let services = self
            .manager
            .list_services()
            .await
            .map_err(|e| platform_error(&self.manager_target(), e))?;

        Ok(services.into_iter().map(Service::from).collect())
    }

    async fn inspect_service(&self, id: &str) -> Result<Service, PlatformError> {
        self.manager
            .inspect_service(id)
            .await
            .map(Service::from)
            .map_err(|e| platform_error(&self.manager_target(), e))
    }

    async fn update_service(
        &self,
        id: &str,
        version: u64,
        spec: &ServiceSpec,
    ) -> Result<(), PlatformError> {
        self.manager
            .update_service(id, version, spec)
            .await
            .map_err(|e| platform_error(&self.manager_target(), e))
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, PlatformError> {
        let nodes = self
            .manager
            .list_nodes()
            .await
            .map_err(|e| platform_error(&self.manager_target(), e))?;

        Ok(nodes.into_iter().map(Node::from).collect())
    }

    async fn list_containers(
        &self,
        host: &HostTarget,
    ) -> Result<Vec<ContainerInstance>, PlatformError> {
        let client = self.client_for(host)?;
        let containers = client
            .list_containers(true)
            .await
            .map_err(|e| platform_error(&host.to_string(), e))?;

        Ok(containers
            .into_iter()
            .map(|container| ContainerInstance::from_engine(container, host.clone()))
            .collect())
    }

    async fn kill_container(&self, host: &HostTarget, id: &str) -> Result<(), PlatformError> {
        let client = self.client_for(host)?;
        client
            .kill_container(id)
            .await
            .map_err(|e| platform_error(&host.to_string(), e))
    }
}

/// Classify an engine error for the given target.
fn platform_error(target: &str, err: EngineError) -> PlatformError {
    if err.is_conflict() {
        return PlatformError::Conflict(err.to_string());
    }
    if err.is_not_found() {
        return PlatformError::NotFound(err.to_string());
    }

    match err {
        EngineError::Api { status, message } => PlatformError::Rejected {
            target: target.to_string(),
            status,
            message,
        },
        EngineError::Json(e) => PlatformError::Malformed {
            target: target.to_string(),
            message: e.to_string(),
        },
        other => PlatformError::Unreachable {
            target: target.to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_platform_error_classification() {
        let conflict = platform_error(
            "unix:///var/run/docker.sock",
            EngineError::Api {
                status: 500,
                message: "update out of sequence".to_string(),
            },
        );
        assert!(matches!(conflict, PlatformError::Conflict(_)));

        let timeout = platform_error(
            "10.0.0.4",
            EngineError::Timeout {
                endpoint: "http://10.0.0.4:2375".to_string(),
                timeout: Duration::from_secs(30),
            },
        );
        assert!(matches!(timeout, PlatformError::Unreachable { ref target, .. } if target == "10.0.0.4"));

        let rejected = platform_error(
            "local",
            EngineError::Api {
                status: 503,
                message: "This node is not a swarm manager.".to_string(),
            },
        );
        assert!(matches!(rejected, PlatformError::Rejected { status: 503, .. }));
    }
}
