//! In-memory swarm for tests.
//!
//! `FakeSwarm` implements `Orchestrator` over plain data. It enforces
//! version tokens the way a swarm manager does, starts new replicas after a
//! configurable number of container listings, records every call, and can
//! be told to fail specific operations.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use swarmkick_engine::types::{ContainerSpec, ReplicatedService, ServiceMode, TaskSpec};
use swarmkick_engine::ServiceSpec;
use swarmkick_rebalance::{
    ContainerInstance, HostTarget, Node, Orchestrator, PlatformError, RunState, Service,
};

/// A call made against the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListServices,
    InspectService(String),
    UpdateService {
        id: String,
        version: u64,
        replicas: Option<u64>,
    },
    ListNodes,
    ListContainers(HostTarget),
    KillContainer {
        host: HostTarget,
        id: String,
    },
}

#[derive(Debug)]
struct PendingReplica {
    container_id: String,
    listings_left: u32,
}

#[derive(Debug, Default)]
struct State {
    services: Vec<Service>,
    hosts: BTreeMap<HostTarget, Vec<ContainerInstance>>,
    nodes: Vec<Node>,
    calls: Vec<Call>,
    unreachable: BTreeSet<HostTarget>,
    nodes_unreachable: bool,
    kill_error: Option<String>,
    update_failures: BTreeMap<usize, PlatformError>,
    updates_seen: usize,
    inspect_failures: BTreeMap<usize, PlatformError>,
    inspects_seen: usize,
    replica_delay: Option<u32>,
    spawn_host: Option<HostTarget>,
    pending: Vec<PendingReplica>,
    spawned: u32,
    clock: i64,
}

/// In-memory `Orchestrator`.
#[derive(Debug)]
pub struct FakeSwarm {
    state: Mutex<State>,
}

impl Default for FakeSwarm {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSwarm {
    /// Empty swarm. New replicas start on the first listing after a scale-up.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                replica_delay: Some(1),
                clock: 1_700_000_000,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a replicated service.
    pub fn with_service(self, name: &str, image: &str, replicas: u64) -> Self {
        let spec = ServiceSpec {
            name: name.to_string(),
            mode: Some(ServiceMode {
                replicated: Some(ReplicatedService { replicas }),
                ..Default::default()
            }),
            task_template: TaskSpec {
                container_spec: Some(ContainerSpec {
                    image: image.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        self.push_service(spec)
    }

    /// Add a global-mode service.
    pub fn with_global_service(self, name: &str, image: &str) -> Self {
        let mut mode = ServiceMode::default();
        mode.extra
            .insert("Global".to_string(), serde_json::json!({}));
        let spec = ServiceSpec {
            name: name.to_string(),
            mode: Some(mode),
            task_template: TaskSpec {
                container_spec: Some(ContainerSpec {
                    image: image.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        self.push_service(spec)
    }

    fn push_service(self, spec: ServiceSpec) -> Self {
        {
            let mut state = self.state();
            let id = format!("svc{}", state.services.len() + 1);
            state.services.push(Service {
                id,
                name: spec.name.clone(),
                version: 10,
                spec,
            });
        }
        self
    }

    /// Add a container on `host`. `age_secs` is how long ago it was created.
    ///
    /// Containers are listed in insertion order.
    pub fn with_container(
        self,
        host: HostTarget,
        id: &str,
        image: &str,
        state: RunState,
        age_secs: i64,
    ) -> Self {
        {
            let mut guard = self.state();
            let created = timestamp(guard.clock - age_secs);
            guard
                .hosts
                .entry(host.clone())
                .or_default()
                .push(ContainerInstance {
                    id: id.to_string(),
                    name: None,
                    image: image.to_string(),
                    state,
                    host,
                    created,
                });
        }
        self
    }

    /// Add a node. With an address its host is `HostTarget::Node { addr }`.
    pub fn with_node(self, id: &str, hostname: &str, addr: Option<&str>, state: &str) -> Self {
        {
            let mut guard = self.state();
            if let Some(addr) = addr {
                guard
                    .hosts
                    .entry(HostTarget::Node {
                        addr: addr.to_string(),
                    })
                    .or_default();
            }
            guard.nodes.push(Node {
                id: id.to_string(),
                hostname: hostname.to_string(),
                addr: addr.map(str::to_string),
                state: state.to_string(),
                availability: "active".to_string(),
                role: "worker".to_string(),
                leader: false,
                reachability: None,
                message: None,
            });
        }
        self
    }

    /// New replicas run once their host has been listed `listings` times.
    pub fn replica_starts_after(self, listings: u32) -> Self {
        self.state().replica_delay = Some(listings.max(1));
        self
    }

    /// New replicas stay pending forever.
    pub fn replica_never_starts(self) -> Self {
        self.state().replica_delay = None;
        self
    }

    /// Host new replicas are placed on (default: `HostTarget::Local`).
    pub fn spawn_on(self, host: HostTarget) -> Self {
        self.state().spawn_host = Some(host);
        self
    }

    /// Container listings on `host` fail as unreachable.
    pub fn with_unreachable_host(self, host: HostTarget) -> Self {
        self.state().unreachable.insert(host);
        self
    }

    /// Node listing fails as unreachable.
    pub fn with_unreachable_manager(self) -> Self {
        self.state().nodes_unreachable = true;
        self
    }

    /// Every kill fails with `message`.
    pub fn with_failing_kill(self, message: &str) -> Self {
        self.state().kill_error = Some(message.to_string());
        self
    }

    /// The `index`-th service update (0-based) fails with `error`.
    pub fn with_failing_update(self, index: usize, error: PlatformError) -> Self {
        self.state().update_failures.insert(index, error);
        self
    }

    /// The `index`-th service inspection (0-based) fails with `error`.
    pub fn with_failing_inspect(self, index: usize, error: PlatformError) -> Self {
        self.state().inspect_failures.insert(index, error);
        self
    }

    /// Bump a service's version as if another actor had updated it.
    pub fn touch_service(&self, name: &str) {
        let mut state = self.state();
        if let Some(service) = state.services.iter_mut().find(|s| s.name == name) {
            service.version += 1;
        }
    }

    /// Current state of a service.
    pub fn service(&self, name: &str) -> Option<Service> {
        self.state()
            .services
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    /// Containers currently on `host`.
    pub fn containers(&self, host: &HostTarget) -> Vec<ContainerInstance> {
        self.state().hosts.get(host).cloned().unwrap_or_default()
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// `(version, replicas)` of every service update attempted.
    pub fn updates(&self) -> Vec<(u64, Option<u64>)> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::UpdateService {
                    version, replicas, ..
                } => Some((*version, *replicas)),
                _ => None,
            })
            .collect()
    }

    /// IDs of every container a kill was attempted on.
    pub fn kills(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::KillContainer { id, .. } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

impl State {
    fn spawn_replicas(&mut self, count: u64, image: &str) {
        let host = self.spawn_host.clone().unwrap_or(HostTarget::Local);
        for _ in 0..count {
            self.spawned += 1;
            self.clock += 1;
            let container_id = format!("new{}", self.spawned);

            // Engines list newest first.
            self.hosts.entry(host.clone()).or_default().insert(
                0,
                ContainerInstance {
                    id: container_id.clone(),
                    name: None,
                    image: image.to_string(),
                    state: RunState::Pending,
                    host: host.clone(),
                    created: timestamp(self.clock),
                },
            );

            if let Some(listings_left) = self.replica_delay {
                self.pending.push(PendingReplica {
                    container_id,
                    listings_left,
                });
            }
        }
    }

    fn advance_pending(&mut self, host: &HostTarget) {
        let spawn_host = self.spawn_host.clone().unwrap_or(HostTarget::Local);
        if *host != spawn_host {
            return;
        }

        let mut started = Vec::new();
        for pending in &mut self.pending {
            pending.listings_left = pending.listings_left.saturating_sub(1);
            if pending.listings_left == 0 {
                started.push(pending.container_id.clone());
            }
        }
        self.pending.retain(|p| p.listings_left > 0);

        if let Some(containers) = self.hosts.get_mut(host) {
            for container in containers.iter_mut() {
                if started.contains(&container.id) {
                    container.state = RunState::Running;
                }
            }
        }
    }
}

#[async_trait]
impl Orchestrator for FakeSwarm {
    async fn list_services(&self) -> Result<Vec<Service>, PlatformError> {
        let mut state = self.state();
        state.calls.push(Call::ListServices);
        Ok(state.services.clone())
    }

    async fn inspect_service(&self, id: &str) -> Result<Service, PlatformError> {
        let mut state = self.state();
        state.calls.push(Call::InspectService(id.to_string()));

        let index = state.inspects_seen;
        state.inspects_seen += 1;
        if let Some(error) = state.inspect_failures.remove(&index) {
            return Err(error);
        }

        state
            .services
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("service {id}")))
    }

    async fn update_service(
        &self,
        id: &str,
        version: u64,
        spec: &ServiceSpec,
    ) -> Result<(), PlatformError> {
        let mut state = self.state();
        state.calls.push(Call::UpdateService {
            id: id.to_string(),
            version,
            replicas: spec.replicas(),
        });

        let index = state.updates_seen;
        state.updates_seen += 1;
        if let Some(error) = state.update_failures.remove(&index) {
            return Err(error);
        }

        let Some(service) = state.services.iter_mut().find(|s| s.id == id) else {
            return Err(PlatformError::NotFound(format!("service {id}")));
        };
        if service.version != version {
            return Err(PlatformError::Conflict(format!(
                "update out of sequence: have {}, got {}",
                service.version, version
            )));
        }

        let before = service.replicas().unwrap_or_default();
        service.spec = spec.clone();
        service.version += 1;
        let after = service.replicas().unwrap_or_default();
        let image = service.image().to_string();

        if after > before {
            state.spawn_replicas(after - before, &image);
        }

        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, PlatformError> {
        let mut state = self.state();
        state.calls.push(Call::ListNodes);
        if state.nodes_unreachable {
            return Err(PlatformError::Unreachable {
                target: "manager".to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(state.nodes.clone())
    }

    async fn list_containers(
        &self,
        host: &HostTarget,
    ) -> Result<Vec<ContainerInstance>, PlatformError> {
        let mut state = self.state();
        state.calls.push(Call::ListContainers(host.clone()));
        if state.unreachable.contains(host) {
            return Err(PlatformError::Unreachable {
                target: host.to_string(),
                message: "connection refused".to_string(),
            });
        }

        state.advance_pending(host);
        Ok(state.hosts.get(host).cloned().unwrap_or_default())
    }

    async fn kill_container(&self, host: &HostTarget, id: &str) -> Result<(), PlatformError> {
        let mut state = self.state();
        state.calls.push(Call::KillContainer {
            host: host.clone(),
            id: id.to_string(),
        });

        if let Some(message) = state.kill_error.clone() {
            return Err(PlatformError::Rejected {
                target: host.to_string(),
                status: 500,
                message,
            });
        }

        let container = state
            .hosts
            .get_mut(host)
            .and_then(|containers| containers.iter_mut().find(|c| c.id == id))
            .ok_or_else(|| PlatformError::NotFound(format!("container {id}")))?;
        container.state = RunState::Stopped;

        Ok(())
    }
}
