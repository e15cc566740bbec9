//! Image expiry decisions

use super::record::ImageRecord;
use crate::container::classifier::cutoff;
use crate::container::UsageMap;
use crate::error::{GcError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::time::Duration;
use tracing::debug;

/// Decide which images are expired.
///
/// An image is kept while any surviving container uses it, or while it was
/// created within `max_age` of `now`. Images do not depend on each other,
/// so the order of `images` does not matter.
pub fn classify_images(
    images: &[ImageRecord],
    usage: &UsageMap,
    now: DateTime<Utc>,
    max_age: Duration,
) -> Vec<ImageRecord> {
    let cutoff = cutoff(now, max_age);

    images
        .iter()
        .filter(|image| {
            if usage.is_used(&image.id) {
                debug!(
                    "Keeping image {}: used by {}",
                    image.short_id(),
                    usage.users(&image.id).join(", ")
                );
                return false;
            }
            if image.created > cutoff {
                debug!("Keeping image {}: created too recently", image.short_id());
                return false;
            }
            debug!("Image {} expired", image.short_id());
            true
        })
        .cloned()
        .collect()
}

/// Repository tag patterns whose images are never collected
#[derive(Debug, Clone, Default)]
pub struct ImageFilter {
    protected: Vec<Regex>,
}

impl ImageFilter {
    /// Compile the protected tag patterns
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let protected = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| {
                    GcError::InvalidConfig(format!("protected image pattern {:?}: {}", p.as_ref(), e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { protected })
    }

    /// Whether any tag of `image` matches a protected pattern
    pub fn is_protected(&self, image: &ImageRecord) -> bool {
        image
            .repo_tags
            .iter()
            .any(|tag| self.protected.iter().any(|re| re.is_match(tag)))
    }

    /// Drop protected images from an expired set; returns how many were dropped
    pub fn retain_unprotected(&self, expired: &mut Vec<ImageRecord>) -> usize {
        let before = expired.len();
        expired.retain(|image| {
            let protected = self.is_protected(image);
            if protected {
                debug!("Keeping image {}: protected tag", image.short_id());
            }
            !protected
        });
        before - expired.len()
    }
}
