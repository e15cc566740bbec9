//! Docker Engine API client
//!
//! Speaks plain HTTP/1.1 to the engine, either over its Unix socket or over
//! TCP. Each request opens its own connection; the collector issues few
//! enough requests that pooling is not worth the bookkeeping.

use super::api::{ContainerInspect, ContainerSummary, ErrorResponse, ImageSummary};
use super::{ContainerRuntime, Endpoint};
use crate::error::{GcError, Result};
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::Method;
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tokio::net::UnixStream;
use tracing::debug;

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Status, version header and body of one engine response
#[derive(Debug)]
struct RawResponse {
    status: u16,
    api_version: Option<String>,
    body: Bytes,
}

/// Client for the Docker Engine REST API
pub struct DockerClient {
    endpoint: Endpoint,
    /// Prefix such as `/v1.41`, empty for the engine's default version
    api_prefix: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl DockerClient {
    /// Create a new client for the given endpoint
    pub fn new(endpoint: Endpoint) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| GcError::Transport(e.to_string()))?;

        Ok(Self {
            endpoint,
            api_prefix: String::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            http,
        })
    }

    /// Pin requests to an API version, e.g. `1.41`
    pub fn api_version(mut self, version: &str) -> Self {
        let version = version.trim().trim_start_matches('v');
        self.api_prefix = if version.is_empty() {
            String::new()
        } else {
            format!("/v{}", version)
        };
        self
    }

    /// Set the per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the endpoint
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn send(&self, method: Method, path: &str) -> Result<RawResponse> {
        let uri = format!("{}{}", self.api_prefix, path);
        debug!("{} {}", method, uri);

        let request = async {
            match &self.endpoint {
                Endpoint::Unix(socket) => send_unix(socket, method.clone(), &uri).await,
                Endpoint::Http(base) => self.send_http(base, method.clone(), &uri).await,
            }
        };

        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| {
                GcError::Transport(format!(
                    "{} {} timed out after {:?}",
                    method, uri, self.timeout
                ))
            })?
    }

    async fn send_http(&self, base: &str, method: Method, uri: &str) -> Result<RawResponse> {
        let response = self
            .http
            .request(method, format!("{}{}", base, uri))
            .send()
            .await
            .map_err(|e| GcError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let api_version = header_string(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| GcError::Transport(e.to_string()))?;

        Ok(RawResponse {
            status,
            api_version,
            body,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        let response = check_status(self.send(Method::GET, path).await?, what)?;
        serde_json::from_slice(&response.body)
            .map_err(|e| GcError::MalformedResponse(format!("{}: {}", what, e)))
    }

    async fn delete(&self, path: &str, what: &str) -> Result<()> {
        check_status(self.send(Method::DELETE, path).await?, what)?;
        Ok(())
    }
}

impl ContainerRuntime for DockerClient {
    async fn ping(&self) -> Result<Option<String>> {
        let response = check_status(self.send(Method::GET, "/_ping").await?, "ping")?;
        Ok(response.api_version)
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        let path = if all {
            "/containers/json?all=1"
        } else {
            "/containers/json"
        };
        self.get_json(path, "container list").await
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspect> {
        self.get_json(&format!("/containers/{}/json", id), &format!("container {}", id))
            .await
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        self.get_json("/images/json", "image list").await
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        self.delete(&format!("/containers/{}", id), &format!("container {}", id))
            .await
    }

    async fn remove_image(&self, reference: &str) -> Result<()> {
        self.delete(&format!("/images/{}", reference), &format!("image {}", reference))
            .await
    }
}

async fn send_unix(socket: &Path, method: Method, uri: &str) -> Result<RawResponse> {
    let stream = UnixStream::connect(socket).await.map_err(|e| {
        GcError::Transport(format!("failed to connect to {}: {}", socket.display(), e))
    })?;

    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| GcError::Transport(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!("Engine connection closed: {}", e);
        }
    });

    let request = hyper::Request::builder()
        .method(method)
        .uri(uri)
        .header(hyper::header::HOST, "docker")
        .body(Empty::<Bytes>::new())
        .map_err(|e| GcError::Transport(e.to_string()))?;

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| GcError::Transport(e.to_string()))?;

    let status = response.status().as_u16();
    let api_version = header_string(response.headers());
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| GcError::Transport(e.to_string()))?
        .to_bytes();

    Ok(RawResponse {
        status,
        api_version,
        body,
    })
}

fn header_string(headers: &hyper::HeaderMap) -> Option<String> {
    headers
        .get("api-version")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Map non-2xx responses onto the error taxonomy
fn check_status(response: RawResponse, what: &str) -> Result<RawResponse> {
    if (200..300).contains(&response.status) {
        return Ok(response);
    }

    let message = serde_json::from_slice::<ErrorResponse>(&response.body)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).trim().to_string());

    Err(match response.status {
        404 => GcError::NotFound(format!("{}: {}", what, message)),
        409 => GcError::Conflict(format!("{}: {}", what, message)),
        status => GcError::Api { status, message },
    })
}
