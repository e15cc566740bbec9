//! In-memory runtime for tests

use super::api::{ContainerInspect, ContainerState, ContainerSummary, HostConfig, ImageSummary};
use super::ContainerRuntime;
use crate::error::{GcError, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Zero value the engine reports for a finish time that was never recorded
pub const UNSET_TIME: &str = "0001-01-01T00:00:00Z";

/// Build an inspect record
pub fn container(
    id: &str,
    name: &str,
    image: &str,
    created: DateTime<Utc>,
    running: bool,
    finished: Option<DateTime<Utc>>,
    volumes_from: &[&str],
) -> ContainerInspect {
    ContainerInspect {
        id: id.to_string(),
        created: Some(created.to_rfc3339()),
        name: format!("/{}", name),
        image: image.to_string(),
        state: ContainerState {
            status: if running { "running" } else { "exited" }.to_string(),
            running,
            started_at: created.to_rfc3339(),
            finished_at: finished
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| UNSET_TIME.to_string()),
        },
        host_config: HostConfig {
            volumes_from: volumes_from.iter().map(|s| s.to_string()).collect(),
        },
    }
}

/// Build an image-list entry
pub fn image(id: &str, created: DateTime<Utc>, tags: &[&str]) -> ImageSummary {
    ImageSummary {
        id: id.to_string(),
        created: created.timestamp(),
        repo_tags: tags.iter().map(|s| s.to_string()).collect(),
        size: 0,
    }
}

/// Scripted runtime recording every call
#[derive(Default)]
pub struct FakeRuntime {
    pub containers: Vec<ContainerInspect>,
    pub images: Vec<ImageSummary>,
    /// Container IDs whose inspection fails with a transport error
    pub broken: HashSet<String>,
    /// Container IDs that are listed but no longer inspectable
    pub vanished: HashSet<String>,
    /// Scripted failures for container removal
    pub container_errors: HashMap<String, fn(String) -> GcError>,
    /// Scripted failures for image removal, keyed by ID or tag
    pub image_errors: HashMap<String, fn(String) -> GcError>,
    pub fail_listing: bool,
    pub removed_containers: Mutex<Vec<String>>,
    /// Every image removal attempt, successful or not
    pub image_attempts: Mutex<Vec<String>>,
}

impl FakeRuntime {
    pub fn new(containers: Vec<ContainerInspect>, images: Vec<ImageSummary>) -> Self {
        Self {
            containers,
            images,
            ..Default::default()
        }
    }

    pub fn removed_containers(&self) -> Vec<String> {
        self.removed_containers.lock().unwrap().clone()
    }

    pub fn image_attempts(&self) -> Vec<String> {
        self.image_attempts.lock().unwrap().clone()
    }
}

impl ContainerRuntime for FakeRuntime {
    async fn list_containers(&self, _all: bool) -> Result<Vec<ContainerSummary>> {
        if self.fail_listing {
            return Err(GcError::Transport("connection refused".to_string()));
        }
        Ok(self
            .containers
            .iter()
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                names: vec![c.name.clone()],
                image_id: c.image.clone(),
                ..Default::default()
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspect> {
        if self.broken.contains(id) {
            return Err(GcError::Transport("connection reset by peer".to_string()));
        }
        if self.vanished.contains(id) {
            return Err(GcError::NotFound(format!("container {}", id)));
        }
        self.containers
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| GcError::NotFound(format!("container {}", id)))
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        Ok(self.images.clone())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        if let Some(make_error) = self.container_errors.get(id) {
            return Err(make_error(id.to_string()));
        }
        self.removed_containers.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn remove_image(&self, reference: &str) -> Result<()> {
        self.image_attempts
            .lock()
            .unwrap()
            .push(reference.to_string());
        match self.image_errors.get(reference) {
            Some(make_error) => Err(make_error(reference.to_string())),
            None => Ok(()),
        }
    }
}
