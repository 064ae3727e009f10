//! Domain model: services, container instances and nodes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use swarmkick_engine::types as engine;
use swarmkick_engine::ServiceSpec;

/// Transient handle to a swarm service.
///
/// The version token changes on every successful update, so a handle is
/// stale after any mutation and must be re-fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    pub id: String,
    pub name: String,

    /// Optimistic concurrency token.
    pub version: u64,

    /// Full spec as read, sent back on update.
    #[serde(skip)]
    pub spec: ServiceSpec,
}

impl Service {
    /// Image every task of the service runs. Empty if the spec has none.
    pub fn image(&self) -> &str {
        self.spec.image().unwrap_or_default()
    }

    /// Desired replica count; `None` for global services.
    pub fn replicas(&self) -> Option<u64> {
        self.spec.replicas()
    }
}

impl From<engine::Service> for Service {
    fn from(service: engine::Service) -> Self {
        Self {
            id: service.id,
            name: service.spec.name.clone(),
            version: service.version.index,
            spec: service.spec,
        }
    }
}

/// Host a container lives on and is addressed through.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostTarget {
    /// The configured engine endpoint.
    Local,

    /// A swarm node reached over its own engine port.
    Node { addr: String },
}

impl fmt::Display for HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Node { addr } => write!(f, "{addr}"),
        }
    }
}

/// Run state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running,
    Stopped,
    Other,
}

impl RunState {
    /// Classify an engine container state.
    pub fn from_engine(state: &str) -> Self {
        match state {
            "created" | "restarting" => Self::Pending,
            "running" => Self::Running,
            "exited" | "dead" | "removing" => Self::Stopped,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// One container observed on one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerInstance {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub image: String,
    pub state: RunState,
    pub host: HostTarget,
    pub created: DateTime<Utc>,
}

impl ContainerInstance {
    /// Build from an engine listing entry seen on `host`.
    pub fn from_engine(container: engine::Container, host: HostTarget) -> Self {
        let name = container
            .names
            .first()
            .map(|name| name.trim_start_matches('/').to_string());

        Self {
            id: container.id,
            name,
            image: container.image,
            state: RunState::from_engine(&container.state),
            host,
            created: DateTime::from_timestamp(container.created, 0).unwrap_or_default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }
}

/// A swarm node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub id: String,
    pub hostname: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,

    /// ready, down, unknown, disconnected.
    pub state: String,

    /// active, pause, drain.
    pub availability: String,

    /// worker or manager.
    pub role: String,

    pub leader: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reachability: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<engine::Node> for Node {
    fn from(node: engine::Node) -> Self {
        let addr = node.addr().map(str::to_string);
        let (leader, reachability) = match &node.manager_status {
            Some(manager) => (manager.leader, Some(manager.reachability.clone())),
            None => (false, None),
        };

        Self {
            id: node.id,
            hostname: node.description.hostname,
            addr,
            state: node.status.state,
            availability: node.spec.availability,
            role: node.spec.role,
            leader,
            reachability,
            message: node.status.message.filter(|m| !m.is_empty()),
        }
    }
}
