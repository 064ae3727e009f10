//! Engine API wire types.
//!
//! Only the fields the rebalancer reads are typed. Service specs keep every
//! other field in `extra` maps so an update sends back exactly what was read.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A swarm service as returned by `GET /services`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Service {
    #[serde(rename = "ID")]
    pub id: String,

    pub version: ObjectVersion,

    pub spec: ServiceSpec,
}

/// Optimistic concurrency stamp of a swarm object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectVersion {
    pub index: u64,
}

/// User-modifiable service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceSpec {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ServiceMode>,

    #[serde(default)]
    pub task_template: TaskSpec,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServiceSpec {
    /// Image the service's tasks run.
    pub fn image(&self) -> Option<&str> {
        self.task_template
            .container_spec
            .as_ref()
            .map(|spec| spec.image.as_str())
            .filter(|image| !image.is_empty())
    }

    /// Desired replica count, `None` for non-replicated (global) services.
    pub fn replicas(&self) -> Option<u64> {
        self.mode
            .as_ref()
            .and_then(|mode| mode.replicated.as_ref())
            .map(|replicated| replicated.replicas)
    }

    /// Set the replica count. Returns false when the service is not replicated.
    pub fn set_replicas(&mut self, replicas: u64) -> bool {
        match self.mode.as_mut().and_then(|mode| mode.replicated.as_mut()) {
            Some(replicated) => {
                replicated.replicas = replicas;
                true
            }
            None => false,
        }
    }
}

/// Scheduling mode of a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceMode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicated: Option<ReplicatedService>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReplicatedService {
    #[serde(default)]
    pub replicas: u64,
}

/// Task template of a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_spec: Option<ContainerSpec>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSpec {
    #[serde(default)]
    pub image: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response of `POST /services/{id}/update`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceUpdateResponse {
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

/// A container as returned by `GET /containers/json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Container {
    pub id: String,

    #[serde(default)]
    pub names: Vec<String>,

    #[serde(default)]
    pub image: String,

    /// Low-level state (created, running, exited, ...).
    #[serde(default)]
    pub state: String,

    /// Human-readable status (Up 3 hours, ...).
    #[serde(default)]
    pub status: String,

    /// Creation time in seconds since the epoch.
    #[serde(default)]
    pub created: i64,
}

/// A swarm node as returned by `GET /nodes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Node {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(default)]
    pub description: NodeDescription,

    #[serde(default)]
    pub spec: NodeSpec,

    #[serde(default)]
    pub status: NodeStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_status: Option<ManagerStatus>,
}

impl Node {
    /// Address other hosts reach this node's engine on.
    ///
    /// Some engine versions report `0.0.0.0` for managers; the manager
    /// address (without its port) is used then.
    pub fn addr(&self) -> Option<&str> {
        let status_addr = self.status.addr.as_str();
        if !status_addr.is_empty() && status_addr != "0.0.0.0" {
            return Some(status_addr);
        }

        self.manager_status
            .as_ref()
            .map(|manager| manager.addr.as_str())
            .filter(|addr| !addr.is_empty())
            .map(|addr| match addr.rsplit_once(':') {
                Some((host, _port)) => host.trim_start_matches('[').trim_end_matches(']'),
                None => addr,
            })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeDescription {
    #[serde(default)]
    pub hostname: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeSpec {
    #[serde(default)]
    pub role: String,

    #[serde(default)]
    pub availability: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeStatus {
    #[serde(default)]
    pub state: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default)]
    pub addr: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManagerStatus {
    #[serde(default)]
    pub leader: bool,

    #[serde(default)]
    pub reachability: String,

    #[serde(default)]
    pub addr: String,
}

/// Error body the engine sends with non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICE_JSON: &str = r#"{
        "ID": "9mnpnzenvg8p8tdbtq4wvbkcz",
        "Version": { "Index": 19 },
        "CreatedAt": "2016-06-07T21:05:51.880065305Z",
        "UpdatedAt": "2016-06-07T21:07:29.962229872Z",
        "Spec": {
            "Name": "web",
            "Labels": { "tier": "frontend" },
            "TaskTemplate": {
                "ContainerSpec": {
                    "Image": "nginx:1.25@sha256:abc",
                    "Env": ["MODE=prod"]
                },
                "RestartPolicy": { "Condition": "any", "MaxAttempts": 0 }
            },
            "Mode": { "Replicated": { "Replicas": 3 } },
            "EndpointSpec": { "Mode": "vip" }
        }
    }"#;

    #[test]
    fn test_service_spec_accessors() {
        let service: Service = serde_json::from_str(SERVICE_JSON).unwrap();

        assert_eq!(service.version.index, 19);
        assert_eq!(service.spec.name, "web");
        assert_eq!(service.spec.image(), Some("nginx:1.25@sha256:abc"));
        assert_eq!(service.spec.replicas(), Some(3));
    }

    #[test]
    fn test_set_replicas_preserves_unknown_fields() {
        let service: Service = serde_json::from_str(SERVICE_JSON).unwrap();
        let mut spec = service.spec.clone();
        assert!(spec.set_replicas(4));

        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["Mode"]["Replicated"]["Replicas"], 4);
        assert_eq!(value["Labels"]["tier"], "frontend");
        assert_eq!(value["EndpointSpec"]["Mode"], "vip");
        assert_eq!(value["TaskTemplate"]["ContainerSpec"]["Env"][0], "MODE=prod");
        assert_eq!(value["TaskTemplate"]["RestartPolicy"]["Condition"], "any");
    }

    #[test]
    fn test_global_service_has_no_replicas() {
        let mut spec: ServiceSpec = serde_json::from_value(serde_json::json!({
            "Name": "agent",
            "Mode": { "Global": {} },
            "TaskTemplate": { "ContainerSpec": { "Image": "agent:1" } }
        }))
        .unwrap();

        assert_eq!(spec.replicas(), None);
        assert!(!spec.set_replicas(2));
        assert_eq!(serde_json::to_value(&spec).unwrap()["Mode"]["Global"], serde_json::json!({}));
    }

    #[test]
    fn test_node_addr_falls_back_to_manager_addr() {
        let node: Node = serde_json::from_value(serde_json::json!({
            "ID": "n1",
            "Description": { "Hostname": "manager-1" },
            "Spec": { "Role": "manager", "Availability": "active" },
            "Status": { "State": "ready", "Addr": "0.0.0.0" },
            "ManagerStatus": { "Leader": true, "Reachability": "reachable", "Addr": "10.0.0.2:2377" }
        }))
        .unwrap();
        assert_eq!(node.addr(), Some("10.0.0.2"));

        let worker: Node = serde_json::from_value(serde_json::json!({
            "ID": "n2",
            "Status": { "State": "down", "Addr": "10.0.0.3" }
        }))
        .unwrap();
        assert_eq!(worker.addr(), Some("10.0.0.3"));
        assert!(worker.manager_status.is_none());
    }
}
