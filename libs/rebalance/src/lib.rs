//! Rolling-kick rebalance for swarm services.
//!
//! A rebalance over-provisions a service by one replica, waits for the new
//! replica to run, kills the oldest container that was running before, and
//! returns the replica count to where it was. The scheduler places the
//! replacement on the least loaded node, so repeated kicks spread a service
//! across nodes that joined after it was deployed.
//!
//! ## Modules
//!
//! - `platform`: the `Orchestrator` seam every operation goes through
//! - `swarm`: `Orchestrator` backed by the Docker Engine API
//! - `inventory`: node listing for diagnostics and cluster fan-out
//! - `census`: per-service container enumeration across hosts
//! - `scale`: version-stamped replica updates
//! - `controller`: the rebalance state machine
//!
//! # Invariants
//!
//! - A successful run leaves the replica count where it found it
//! - Only a container running before the scale-up is ever killed
//! - Nothing is mutated when no container of the service is running

pub mod census;
pub mod controller;
mod error;
pub mod inventory;
pub mod model;
pub mod platform;
pub mod scale;
pub mod swarm;

pub use census::{CensusPolicy, CensusReport, CensusScope, HostFailure};
pub use controller::{
    DiagnosticReport, Outcome, Phase, RebalanceConfig, RebalanceController, RebalanceReport,
};
pub use error::{RebalanceError, Result};
pub use model::{ContainerInstance, HostTarget, Node, RunState, Service};
pub use platform::{Orchestrator, PlatformError};
pub use swarm::SwarmPlatform;
