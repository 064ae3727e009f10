//! Rebalance error taxonomy.

use std::time::Duration;

use thiserror::Error;

use crate::controller::Phase;
use crate::model::Service;
use crate::platform::PlatformError;

/// Result type for rebalance operations.
pub type Result<T> = std::result::Result<T, RebalanceError>;

/// Errors that end a rebalance.
///
/// Nothing is retried. Failures after the scale-up are wrapped in
/// `Aborted`, which records whether the replica count was restored.
#[derive(Debug, Error)]
pub enum RebalanceError {
    #[error("service '{0}' not found")]
    NotFound(String),

    #[error("{target} unreachable: {message}")]
    Connectivity { target: String, message: String },

    #[error("version conflict updating service '{service}' at version {version}: {message}")]
    Conflict {
        service: String,
        version: u64,
        message: String,
    },

    #[error("failed to terminate container {container} on {host}: {message}")]
    Termination {
        container: String,
        host: String,
        message: String,
    },

    #[error("timeout after {elapsed:?} ({polls} polls) waiting for a new replica of '{service}'")]
    Timeout {
        service: String,
        elapsed: Duration,
        polls: u32,
    },

    #[error("rebalance of '{service}' cancelled")]
    Cancelled { service: String },

    #[error("service '{0}' is not in replicated mode")]
    NotReplicated(String),

    #[error(
        "rebalance of '{service}' aborted after {phase} (replicas {}): {source}",
        restored_label(.compensated)
    )]
    Aborted {
        service: String,

        /// Replica count before the scale-up.
        replicas: u64,
        phase: Phase,
        compensated: bool,
        #[source]
        source: Box<RebalanceError>,
    },
}

fn restored_label(compensated: &bool) -> &'static str {
    if *compensated {
        "restored"
    } else {
        "NOT restored"
    }
}

impl RebalanceError {
    /// The error that started the failure, looking through `Aborted`.
    pub fn root(&self) -> &RebalanceError {
        match self {
            Self::Aborted { source, .. } => source.root(),
            other => other,
        }
    }

    /// True when a failure left the service with more replicas than it had.
    pub fn is_dirty(&self) -> bool {
        matches!(
            self,
            Self::Aborted {
                compensated: false,
                ..
            }
        )
    }

    /// Map a platform error for an operation on `service`.
    pub(crate) fn from_platform(err: PlatformError, service: &Service) -> Self {
        match err {
            PlatformError::NotFound(_) => Self::NotFound(service.name.clone()),
            PlatformError::Conflict(message) => Self::Conflict {
                service: service.name.clone(),
                version: service.version,
                message,
            },
            other => Self::from(other),
        }
    }
}

/// Conversion for operations not scoped to one service. Every failure is a
/// connectivity error; an unexpected status keeps its code in the message.
impl From<PlatformError> for RebalanceError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::NotFound(message) => Self::Connectivity {
                target: "engine".to_string(),
                message: format!("status 404: {message}"),
            },
            PlatformError::Conflict(message) => Self::Connectivity {
                target: "engine".to_string(),
                message: format!("status 409: {message}"),
            },
            PlatformError::Unreachable { target, message }
            | PlatformError::Malformed { target, message } => {
                Self::Connectivity { target, message }
            }
            PlatformError::Rejected {
                target,
                status,
                message,
            } => Self::Connectivity {
                target,
                message: format!("status {status}: {message}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_and_dirty() {
        let err = RebalanceError::Aborted {
            service: "web".to_string(),
            replicas: 3,
            phase: Phase::ScaledUp,
            compensated: false,
            source: Box::new(RebalanceError::Timeout {
                service: "web".to_string(),
                elapsed: Duration::from_secs(600),
                polls: 120,
            }),
        };

        assert!(err.is_dirty());
        assert!(matches!(err.root(), RebalanceError::Timeout { polls: 120, .. }));
        assert!(err.to_string().contains("NOT restored"));
    }

    fn web() -> Service {
        Service {
            id: "svc1".to_string(),
            name: "web".to_string(),
            version: 42,
            spec: Default::default(),
        }
    }

    #[test]
    fn test_platform_not_found_names_service() {
        let err = RebalanceError::from_platform(PlatformError::NotFound("svc1".to_string()), &web());
        assert!(matches!(err, RebalanceError::NotFound(name) if name == "web"));
    }

    #[test]
    fn test_platform_conflict_names_service_and_version() {
        let err = RebalanceError::from_platform(
            PlatformError::Conflict("update out of sequence".to_string()),
            &web(),
        );
        assert_eq!(
            err.to_string(),
            "version conflict updating service 'web' at version 42: update out of sequence"
        );
    }

    #[test]
    fn test_unscoped_conflict_is_not_a_version_conflict() {
        let err = RebalanceError::from(PlatformError::Conflict("busy".to_string()));
        assert!(matches!(
            err,
            RebalanceError::Connectivity { ref message, .. } if message == "status 409: busy"
        ));
    }
}
