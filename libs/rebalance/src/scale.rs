//! Scale operator.

use tracing::info;

use crate::error::{RebalanceError, Result};
use crate::model::Service;
use crate::platform::Orchestrator;

/// Set the desired replica count of `service`.
///
/// The update carries the handle's full spec and version token. A stale
/// token fails with `Conflict` and is not retried; re-fetch before trying
/// again. Returns the re-fetched service with its new version token.
///
/// A `Connectivity` error does not prove the update was rejected: the engine
/// may have applied it before the connection failed, or the re-fetch after
/// it may be what failed.
pub async fn scale(
    platform: &dyn Orchestrator,
    service: &Service,
    replicas: u64,
) -> Result<Service> {
    let mut spec = service.spec.clone();
    if !spec.set_replicas(replicas) {
        return Err(RebalanceError::NotReplicated(service.name.clone()));
    }

    info!(
        service = %service.name,
        from = service.replicas().unwrap_or_default(),
        to = replicas,
        version = service.version,
        "Scaling service"
    );

    platform
        .update_service(&service.id, service.version, &spec)
        .await
        .map_err(|e| RebalanceError::from_platform(e, service))?;

    platform
        .inspect_service(&service.id)
        .await
        .map_err(|e| RebalanceError::from_platform(e, service))
}
