//! Node inventory.

use tracing::{debug, info};

use crate::error::Result;
use crate::model::Node;
use crate::platform::Orchestrator;

/// List swarm nodes.
pub async fn list_nodes(platform: &dyn Orchestrator) -> Result<Vec<Node>> {
    let nodes = platform.list_nodes().await?;
    debug!(count = nodes.len(), "Listed swarm nodes");
    Ok(nodes)
}

/// Log one line per node for operator inspection.
pub fn log_nodes(nodes: &[Node]) {
    for node in nodes {
        info!(
            node_id = %node.id,
            hostname = %node.hostname,
            addr = node.addr.as_deref().unwrap_or("-"),
            state = %node.state,
            availability = %node.availability,
            role = %node.role,
            leader = node.leader,
            reachability = node.reachability.as_deref().unwrap_or("-"),
            "Node status"
        );
    }
}
