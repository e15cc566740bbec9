//! Container runtime access
//!
//! The collector only needs five capabilities from the engine: list and
//! inspect containers, list images, and remove either. [`ContainerRuntime`]
//! names them; [`DockerClient`] provides them over the Docker Engine API.

pub mod api;
pub mod client;
#[cfg(test)]
pub(crate) mod fake;

pub use api::{ContainerInspect, ContainerSummary, ImageSummary};
pub use client::DockerClient;

use crate::error::{GcError, Result};
use std::path::PathBuf;
use std::str::FromStr;

/// Default Docker daemon address
pub const DEFAULT_ENDPOINT: &str = "unix:///var/run/docker.sock";

/// Operations the collector performs against a container engine.
///
/// Calls are awaited one at a time; implementations must not retry on their
/// own beyond what a single request/response needs.
#[allow(async_fn_in_trait)]
pub trait ContainerRuntime {
    /// Check that the engine answers; returns its API version when reported
    async fn ping(&self) -> Result<Option<String>> {
        Ok(None)
    }

    /// List containers, including stopped ones when `all` is set
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>>;

    /// Fetch the full record of one container
    async fn inspect_container(&self, id: &str) -> Result<ContainerInspect>;

    /// List top-level images
    async fn list_images(&self) -> Result<Vec<ImageSummary>>;

    /// Remove a stopped container
    async fn remove_container(&self, id: &str) -> Result<()>;

    /// Remove an image by ID or repository tag.
    ///
    /// Fails with [`GcError::Conflict`] while the image is in use.
    async fn remove_image(&self, reference: &str) -> Result<()>;
}

/// Address of the engine API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Path of a Unix domain socket
    Unix(PathBuf),
    /// Base URL of a TCP endpoint, e.g. `http://127.0.0.1:2375`
    Http(String),
}

impl FromStr for Endpoint {
    type Err = GcError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(GcError::InvalidEndpoint(s.to_string()));
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }
        if let Some(addr) = s.strip_prefix("tcp://") {
            if addr.is_empty() {
                return Err(GcError::InvalidEndpoint(s.to_string()));
            }
            return Ok(Endpoint::Http(format!("http://{}", addr.trim_end_matches('/'))));
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            return Ok(Endpoint::Http(s.trim_end_matches('/').to_string()));
        }
        if s.starts_with('/') {
            return Ok(Endpoint::Unix(PathBuf::from(s)));
        }
        Err(GcError::InvalidEndpoint(s.to_string()))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
            Endpoint::Http(url) => write!(f, "{}", url),
        }
    }
}
