//! HTTP client for the Engine API.

use std::time::Duration;

use hyper::{Body, Client, Request};
use hyperlocal::{UnixClientExt, UnixConnector, Uri};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::endpoint::Endpoint;
use crate::error::EngineError;
use crate::types::{Container, ErrorResponse, Node, Service, ServiceSpec, ServiceUpdateResponse};

/// Connection options shared by every client built for one run.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Upper bound for a single request, connect through body.
    pub timeout: Duration,

    /// API version prefix (example: "1.43"). Unversioned paths when `None`.
    pub api_version: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            api_version: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Verb {
    Get,
    Post,
}

#[derive(Clone)]
enum Transport {
    Unix {
        socket_path: String,
        client: Client<UnixConnector>,
    },
    Http {
        base_url: String,
        client: reqwest::Client,
    },
}

/// Engine API client bound to one endpoint.
#[derive(Clone)]
pub struct EngineClient {
    endpoint: Endpoint,
    transport: Transport,
    options: ClientOptions,
}

impl std::fmt::Debug for EngineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineClient")
            .field("endpoint", &self.endpoint)
            .field("options", &self.options)
            .finish()
    }
}

impl EngineClient {
    /// Create a client for the given endpoint.
    pub fn new(endpoint: Endpoint, options: &ClientOptions) -> Result<Self, EngineError> {
        let transport = match &endpoint {
            Endpoint::Unix(path) => Transport::Unix {
                socket_path: path.to_string_lossy().to_string(),
                client: Client::unix(),
            },
            Endpoint::Http(base_url) => {
                let client = reqwest::Client::builder()
                    .timeout(options.timeout)
                    .build()
                    .map_err(|e| EngineError::Transport {
                        endpoint: base_url.clone(),
                        message: e.to_string(),
                    })?;
                Transport::Http {
                    base_url: base_url.clone(),
                    client,
                }
            }
        };

        Ok(Self {
            endpoint,
            transport,
            options: options.clone(),
        })
    }

    /// Endpoint this client talks to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// List all services.
    pub async fn list_services(&self) -> Result<Vec<Service>, EngineError> {
        self.get("/services").await
    }

    /// Inspect one service by ID or name.
    pub async fn inspect_service(&self, id: &str) -> Result<Service, EngineError> {
        self.get(&format!("/services/{id}")).await
    }

    /// Replace a service's spec, stamped with the version it was read at.
    pub async fn update_service(
        &self,
        id: &str,
        version: u64,
        spec: &ServiceSpec,
    ) -> Result<(), EngineError> {
        let body = serde_json::to_vec(spec)?;
        let path = format!("/services/{id}/update?version={version}");
        let bytes = self.send(Verb::Post, &path, Some(body)).await?;

        let response: ServiceUpdateResponse = if bytes.is_empty() {
            ServiceUpdateResponse::default()
        } else {
            serde_json::from_slice(&bytes)?
        };
        for warning in response.warnings.unwrap_or_default() {
            warn!(service_id = %id, warning = %warning, "Engine returned update warning");
        }

        Ok(())
    }

    /// List swarm nodes. Requires a manager endpoint.
    pub async fn list_nodes(&self) -> Result<Vec<Node>, EngineError> {
        self.get("/nodes").await
    }

    /// List containers on this endpoint's host.
    pub async fn list_containers(&self, all: bool) -> Result<Vec<Container>, EngineError> {
        if all {
            self.get("/containers/json?all=1").await
        } else {
            self.get("/containers/json").await
        }
    }

    /// Send SIGKILL to a container.
    pub async fn kill_container(&self, id: &str) -> Result<(), EngineError> {
        self.send(Verb::Post, &format!("/containers/{id}/kill"), None)
            .await
            .map(|_| ())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, EngineError> {
        let bytes = self.send(Verb::Get, path, None).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn versioned(&self, path: &str) -> String {
        match self.options.api_version.as_deref() {
            Some(version) => format!("/v{}{}", version.trim_start_matches('v'), path),
            None => path.to_string(),
        }
    }

    /// Send a request and return the body of a successful response.
    async fn send(
        &self,
        verb: Verb,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, EngineError> {
        let path = self.versioned(path);
        debug!(endpoint = %self.endpoint, ?verb, path = %path, "Engine API request");

        let exchange = async {
            match &self.transport {
                Transport::Unix {
                    socket_path,
                    client,
                } => self.send_unix(client, socket_path, verb, &path, body).await,
                Transport::Http { base_url, client } => {
                    self.send_http(client, base_url, verb, &path, body).await
                }
            }
        };

        let (status, bytes) = tokio::time::timeout(self.options.timeout, exchange)
            .await
            .map_err(|_| EngineError::Timeout {
                endpoint: self.endpoint.to_string(),
                timeout: self.options.timeout,
            })??;

        if (200..300).contains(&status) {
            Ok(bytes)
        } else {
            let message = serde_json::from_slice::<ErrorResponse>(&bytes)
                .map(|e| e.message)
                .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).trim().to_string());
            debug!(status, message = %message, "Engine API error");
            Err(EngineError::Api { status, message })
        }
    }

    async fn send_unix(
        &self,
        client: &Client<UnixConnector>,
        socket_path: &str,
        verb: Verb,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(u16, Vec<u8>), EngineError> {
        let method = match verb {
            Verb::Get => hyper::Method::GET,
            Verb::Post => hyper::Method::POST,
        };

        let mut builder = Request::builder()
            .method(method)
            .uri(Uri::new(socket_path, path))
            .header("Accept", "application/json");
        if body.is_some() {
            builder = builder.header("Content-Type", "application/json");
        }

        let request = builder
            .body(body.map(Body::from).unwrap_or_else(Body::empty))
            .map_err(|e| self.transport_error(e))?;

        let response = client
            .request(request)
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status().as_u16();
        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| self.transport_error(e))?;

        Ok((status, bytes.to_vec()))
    }

    async fn send_http(
        &self,
        client: &reqwest::Client,
        base_url: &str,
        verb: Verb,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(u16, Vec<u8>), EngineError> {
        let url = format!("{base_url}{path}");
        let mut request = match verb {
            Verb::Get => client.get(&url),
            Verb::Post => client.post(&url),
        }
        .header(ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;

        Ok((status, bytes.to_vec()))
    }

    fn transport_error(&self, err: impl std::fmt::Display) -> EngineError {
        EngineError::Transport {
            endpoint: self.endpoint.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versioned_paths() {
        let unversioned = EngineClient::new(Endpoint::default(), &ClientOptions::default()).unwrap();
        assert_eq!(unversioned.versioned("/services"), "/services");

        let options = ClientOptions {
            api_version: Some("v1.43".to_string()),
            ..ClientOptions::default()
        };
        let versioned =
            EngineClient::new(Endpoint::Http("http://manager:2375".to_string()), &options).unwrap();
        assert_eq!(versioned.versioned("/services"), "/v1.43/services");
    }
}
