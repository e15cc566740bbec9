//! Best-effort removal of expired containers and images

use crate::container::ContainerRecord;
use crate::image::ImageRecord;
use crate::runtime::ContainerRuntime;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Result of removing one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RemovalOutcome {
    /// Removed; `via` is the ID or tag that was accepted
    Removed { via: String },
    /// Dry run, nothing was sent to the engine
    DryRun,
    /// The engine reported the item as in use; retried next cycle
    InUse,
    /// Removal failed for another reason
    Failed { reason: String },
}

/// Issues delete requests, one item at a time.
///
/// A failure never stops the remaining removals.
pub struct Remover<'a, R> {
    runtime: &'a R,
    dry_run: bool,
}

impl<'a, R: ContainerRuntime> Remover<'a, R> {
    pub fn new(runtime: &'a R, dry_run: bool) -> Self {
        Self { runtime, dry_run }
    }

    pub async fn remove_container(&self, container: &ContainerRecord) -> RemovalOutcome {
        if self.dry_run {
            info!("Would remove container {} ({})", container.id, container.name);
            return RemovalOutcome::DryRun;
        }

        info!("rm {} ({})", container.id, container.name);
        match self.runtime.remove_container(&container.id).await {
            Ok(()) => RemovalOutcome::Removed {
                via: container.id.clone(),
            },
            Err(e) if e.is_conflict() => {
                debug!("Container {} is in use: {}", container.name, e);
                RemovalOutcome::InUse
            }
            Err(e) => {
                warn!("Couldn't remove container {}: {}", container.name, e);
                RemovalOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub async fn remove_containers(&self, containers: &[ContainerRecord]) -> Vec<RemovalOutcome> {
        let mut outcomes = Vec::with_capacity(containers.len());
        for container in containers {
            outcomes.push(self.remove_container(container).await);
        }
        outcomes
    }

    /// Remove by ID, falling back to each repository tag in order.
    ///
    /// Some engines refuse ID-based removal of multi-tagged images but
    /// accept removal by tag. The first accepted reference wins.
    pub async fn remove_image(&self, image: &ImageRecord) -> RemovalOutcome {
        if self.dry_run {
            info!("Would remove image {} {:?}", image.id, image.repo_tags);
            return RemovalOutcome::DryRun;
        }

        info!("rmi {}", image.id);
        let mut in_use = false;
        let mut last_error = None;

        for reference in std::iter::once(&image.id).chain(image.repo_tags.iter()) {
            match self.runtime.remove_image(reference).await {
                Ok(()) => {
                    return RemovalOutcome::Removed {
                        via: reference.clone(),
                    }
                }
                Err(e) => {
                    debug!("Removing image {} as {} failed: {}", image.short_id(), reference, e);
                    in_use |= e.is_conflict();
                    last_error = Some(e);
                }
            }
        }

        if in_use {
            debug!("Image {} is in use", image.short_id());
            return RemovalOutcome::InUse;
        }

        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        warn!("Couldn't remove image {}: {}", image.id, reason);
        RemovalOutcome::Failed { reason }
    }

    pub async fn remove_images(&self, images: &[ImageRecord]) -> Vec<RemovalOutcome> {
        let mut outcomes = Vec::with_capacity(images.len());
        for image in images {
            outcomes.push(self.remove_image(image).await);
        }
        outcomes
    }
}
