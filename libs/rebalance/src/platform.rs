//! Orchestration platform interface.
//!
//! Every operation the rebalancer performs against the cluster goes through
//! an explicitly passed `Orchestrator`. Production code uses `SwarmPlatform`;
//! tests substitute an in-memory fake.

use async_trait::async_trait;
use swarmkick_engine::ServiceSpec;
use thiserror::Error;

use crate::model::{ContainerInstance, HostTarget, Node, Service};

/// Errors reported by an orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("{target} unreachable: {message}")]
    Unreachable { target: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("version conflict: {0}")]
    Conflict(String),

    #[error("{target} rejected request ({status}): {message}")]
    Rejected {
        target: String,
        status: u16,
        message: String,
    },

    #[error("malformed response from {target}: {message}")]
    Malformed { target: String, message: String },
}

/// Cluster operations the rebalancer needs.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// List every service in the swarm.
    async fn list_services(&self) -> Result<Vec<Service>, PlatformError>;

    /// Fetch the current state of one service, including its version token.
    async fn inspect_service(&self, id: &str) -> Result<Service, PlatformError>;

    /// Replace a service's spec. `version` must match the current token.
    async fn update_service(
        &self,
        id: &str,
        version: u64,
        spec: &ServiceSpec,
    ) -> Result<(), PlatformError>;

    /// List swarm nodes.
    async fn list_nodes(&self) -> Result<Vec<Node>, PlatformError>;

    /// List every container on one host, whatever its state.
    async fn list_containers(
        &self,
        host: &HostTarget,
    ) -> Result<Vec<ContainerInstance>, PlatformError>;

    /// Kill a container on the host it lives on.
    async fn kill_container(&self, host: &HostTarget, id: &str) -> Result<(), PlatformError>;
}
