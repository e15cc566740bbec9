//! One classify-then-remove pass

use super::remover::{RemovalOutcome, Remover};
use crate::config::DEFAULT_MAX_AGE;
use crate::container::classify_containers;
use crate::error::Result;
use crate::image::{classify_images, ImageFilter, ImageRecord};
use crate::runtime::ContainerRuntime;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// Inputs of a single cycle
#[derive(Debug, Clone)]
pub struct CycleOptions {
    pub max_container_age: Duration,
    pub max_image_age: Duration,
    /// Remove containers that never recorded a finish time
    pub allow_missing_finish_time: bool,
    /// Classify and report, but send no delete requests
    pub dry_run: bool,
    /// Images matching these tags are never removed
    pub image_filter: ImageFilter,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            max_container_age: DEFAULT_MAX_AGE,
            max_image_age: DEFAULT_MAX_AGE,
            allow_missing_finish_time: false,
            dry_run: false,
            image_filter: ImageFilter::default(),
        }
    }
}

/// Counts reported after a cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub dry_run: bool,
    pub containers_evaluated: usize,
    pub containers_inspect_failed: usize,
    /// Old enough, but kept as a volume source
    pub containers_pinned: usize,
    pub containers_expired: usize,
    pub containers_removed: usize,
    pub containers_in_use: usize,
    pub containers_failed: usize,
    pub images_evaluated: usize,
    pub images_protected: usize,
    pub images_expired: usize,
    pub images_removed: usize,
    pub images_in_use: usize,
    pub images_failed: usize,
}

impl Summary {
    fn count_container(&mut self, outcome: &RemovalOutcome) {
        match outcome {
            RemovalOutcome::Removed { .. } => self.containers_removed += 1,
            RemovalOutcome::InUse => self.containers_in_use += 1,
            RemovalOutcome::Failed { .. } => self.containers_failed += 1,
            RemovalOutcome::DryRun => {}
        }
    }

    fn count_image(&mut self, outcome: &RemovalOutcome) {
        match outcome {
            RemovalOutcome::Removed { .. } => self.images_removed += 1,
            RemovalOutcome::InUse => self.images_in_use += 1,
            RemovalOutcome::Failed { .. } => self.images_failed += 1,
            RemovalOutcome::DryRun => {}
        }
    }

    /// Per-item failures that were logged and skipped
    pub fn failures(&self) -> usize {
        self.containers_inspect_failed + self.containers_failed + self.images_failed
    }

    /// Log the summary at info level
    pub fn log(&self) {
        let verb = if self.dry_run { "would remove" } else { "removed" };
        let (containers, images) = if self.dry_run {
            (self.containers_expired, self.images_expired)
        } else {
            (self.containers_removed, self.images_removed)
        };
        info!(
            "Cycle done: {} {} of {} containers and {} of {} images ({} pinned, {} in use, {} failures)",
            verb,
            containers,
            self.containers_evaluated,
            images,
            self.images_evaluated,
            self.containers_pinned,
            self.containers_in_use + self.images_in_use,
            self.failures()
        );
    }
}

/// Run one garbage-collection cycle.
///
/// Containers are classified first, their surviving image users feed the
/// image classification, and only then are removals issued: containers
/// before images. Listing failures and malformed timestamps abort the
/// cycle; everything per item is counted and skipped.
pub async fn run_cycle<R: ContainerRuntime>(
    runtime: &R,
    now: DateTime<Utc>,
    options: &CycleOptions,
) -> Result<Summary> {
    let mut summary = Summary {
        dry_run: options.dry_run,
        ..Default::default()
    };

    let containers = runtime.list_containers(true).await?;
    let classification = classify_containers(
        runtime,
        &containers,
        now,
        options.max_container_age,
        options.allow_missing_finish_time,
    )
    .await?;
    summary.containers_evaluated = classification.evaluated;
    summary.containers_inspect_failed = classification.inspect_failures;
    summary.containers_pinned = classification.pinned;
    summary.containers_expired = classification.expired.len();

    let images = runtime
        .list_images()
        .await?
        .into_iter()
        .map(ImageRecord::try_from)
        .collect::<Result<Vec<_>>>()?;
    summary.images_evaluated = images.len();

    let mut expired_images =
        classify_images(&images, &classification.usage, now, options.max_image_age);
    summary.images_protected = options.image_filter.retain_unprotected(&mut expired_images);
    summary.images_expired = expired_images.len();

    let remover = Remover::new(runtime, options.dry_run);

    info!("Found {} expired containers", classification.expired.len());
    for outcome in remover.remove_containers(&classification.expired).await {
        summary.count_container(&outcome);
    }

    info!("Found {} expired images", expired_images.len());
    for outcome in remover.remove_images(&expired_images).await {
        summary.count_image(&outcome);
    }

    Ok(summary)
}
