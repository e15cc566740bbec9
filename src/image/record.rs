//! Image records as seen by the classifier

use crate::error::{GcError, Result};
use crate::runtime::ImageSummary;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Placeholder tag the engine reports for untagged images
const UNTAGGED: &str = "<none>:<none>";

/// Container image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    /// Image ID (sha256 hash)
    pub id: String,
    /// Created timestamp
    pub created: DateTime<Utc>,
    /// Repository tags (e.g., ["nginx:latest", "nginx:1.21"])
    pub repo_tags: Vec<String>,
}

impl TryFrom<ImageSummary> for ImageRecord {
    type Error = GcError;

    fn try_from(summary: ImageSummary) -> Result<Self> {
        let created = DateTime::<Utc>::from_timestamp(summary.created, 0).ok_or_else(|| {
            GcError::malformed_timestamp(
                format!("image {} Created", summary.id),
                summary.created.to_string(),
            )
        })?;

        Ok(Self {
            id: summary.id,
            created,
            repo_tags: summary
                .repo_tags
                .into_iter()
                .filter(|tag| tag != UNTAGGED)
                .collect(),
        })
    }
}

impl ImageRecord {
    /// Short form of the ID for log lines
    pub fn short_id(&self) -> &str {
        let id = self.id.strip_prefix("sha256:").unwrap_or(&self.id);
        id.get(..12).unwrap_or(id)
    }
}
