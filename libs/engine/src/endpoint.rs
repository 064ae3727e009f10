//! Engine endpoint addressing.

use std::fmt;
use std::path::PathBuf;

use crate::error::EngineError;

/// Default local engine socket.
pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

/// Default port for host-scoped engine connections.
pub const DEFAULT_NODE_PORT: u16 = 2375;

/// Where an engine API is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket on this host.
    Unix(PathBuf),

    /// HTTP base URL without a trailing slash (example: http://10.0.0.5:2375).
    Http(String),
}

impl Endpoint {
    /// Parse a `DOCKER_HOST` style address.
    ///
    /// Accepts `unix:///path`, `tcp://host:port`, `http(s)://host:port` and
    /// bare absolute socket paths.
    pub fn parse(value: &str) -> Result<Self, EngineError> {
        let value = value.trim();

        if let Some(path) = value.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(EngineError::InvalidEndpoint(value.to_string()));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }

        if value.starts_with('/') {
            return Ok(Self::Unix(PathBuf::from(value)));
        }

        let base = if let Some(rest) = value.strip_prefix("tcp://") {
            format!("http://{rest}")
        } else if value.starts_with("http://") || value.starts_with("https://") {
            value.to_string()
        } else {
            return Err(EngineError::InvalidEndpoint(value.to_string()));
        };

        let base = base.trim_end_matches('/').to_string();
        let authority = base.split_once("://").map(|(_, a)| a).unwrap_or_default();
        if authority.is_empty() {
            return Err(EngineError::InvalidEndpoint(value.to_string()));
        }

        Ok(Self::Http(base))
    }

    /// Host-scoped endpoint for a swarm node address.
    pub fn node(addr: &str, port: u16) -> Self {
        if addr.contains(':') && !addr.starts_with('[') {
            Self::Http(format!("http://[{addr}]:{port}"))
        } else {
            Self::Http(format!("http://{addr}:{port}"))
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::Unix(PathBuf::from(DEFAULT_SOCKET))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Http(base) => write!(f, "{base}"),
        }
    }
}
