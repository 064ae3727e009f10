//! Errors from the Engine API.

use std::time::Duration;

use thiserror::Error;

/// Message fragment swarm returns when an update carries a stale version.
const OUT_OF_SEQUENCE: &str = "update out of sequence";

/// Errors from the Engine API client.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid engine endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("failed to reach {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("request to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("engine API error {status}: {message}")]
    Api { status: u16, message: String },
}

impl EngineError {
    /// The addressed object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }

    /// The update was rejected because the version token is stale.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Api { status: 409, .. } => true,
            Self::Api { message, .. } => message.contains(OUT_OF_SEQUENCE),
            _ => false,
        }
    }

    /// The endpoint could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_detection() {
        let explicit = EngineError::Api {
            status: 409,
            message: "conflict".to_string(),
        };
        assert!(explicit.is_conflict());

        let out_of_sequence = EngineError::Api {
            status: 500,
            message: "rpc error: code = Unknown desc = update out of sequence".to_string(),
        };
        assert!(out_of_sequence.is_conflict());
        assert!(!out_of_sequence.is_not_found());

        let missing = EngineError::Api {
            status: 404,
            message: "service web not found".to_string(),
        };
        assert!(missing.is_not_found());
        assert!(!missing.is_conflict());
    }
}
