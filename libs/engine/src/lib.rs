//! Docker Engine API client.
//!
//! Speaks the subset of the Engine HTTP API a swarm rebalance needs:
//! services (list, inspect, update), nodes (list) and containers
//! (list, kill). The client talks either to the local unix socket or to a
//! host-scoped TCP endpoint, so the same type serves the manager connection
//! and per-node container queries.
//!
//! Reference: https://docs.docker.com/engine/api/latest/

mod client;
mod endpoint;
mod error;
pub mod types;

pub use client::{ClientOptions, EngineClient};
pub use endpoint::{Endpoint, DEFAULT_NODE_PORT, DEFAULT_SOCKET};
pub use error::EngineError;
pub use types::{Container, Node, Service, ServiceSpec};
