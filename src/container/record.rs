//! Container records as seen by the classifier

use crate::error::{GcError, Result};
use crate::runtime::ContainerInspect;
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

/// Inspected container, reduced to what expiry decisions need
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerRecord {
    /// Container ID
    pub id: String,
    /// Container name without the leading `/`
    pub name: String,
    /// Creation time
    pub created: DateTime<Utc>,
    /// Whether the container is running
    pub running: bool,
    /// Exit time; `None` when the engine never recorded one.
    /// Only meaningful while `running` is false.
    pub finished: Option<DateTime<Utc>>,
    /// ID of the image the container was started from
    pub image: String,
    /// Names of the containers this one mounts volumes from
    pub volumes_from: Vec<String>,
}

impl ContainerRecord {
    /// Build a record from an inspect response.
    ///
    /// A missing or unparsable timestamp is an error: age comparisons
    /// cannot be trusted once the engine breaks its own format.
    pub fn from_inspect(inspect: ContainerInspect) -> Result<Self> {
        let created = match inspect.created.as_deref() {
            Some(value) if !value.trim().is_empty() => parse_timestamp("Created", value)?,
            Some(value) => return Err(GcError::malformed_timestamp("Created", value)),
            None => return Err(GcError::malformed_timestamp("Created", "")),
        };
        let finished = parse_finished_at(&inspect.state.finished_at)?;

        Ok(Self {
            name: inspect.name.trim_start_matches('/').to_string(),
            created,
            running: inspect.state.running,
            finished,
            image: inspect.image,
            volumes_from: inspect
                .host_config
                .volumes_from
                .iter()
                .map(|source| volume_source_name(source).to_string())
                .collect(),
            id: inspect.id,
        })
    }

    /// Short form of the ID for log lines
    pub fn short_id(&self) -> &str {
        self.id.get(..12).unwrap_or(&self.id)
    }
}

fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| GcError::malformed_timestamp(field, value))
}

/// The engine reports `0001-01-01T00:00:00Z` for containers that never exited
fn parse_finished_at(value: &str) -> Result<Option<DateTime<Utc>>> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    let finished = parse_timestamp("State.FinishedAt", value)?;
    if finished.year() <= 1 {
        return Ok(None);
    }
    Ok(Some(finished))
}

/// `VolumesFrom` entries may carry a `:ro` or `:rw` mode suffix
fn volume_source_name(source: &str) -> &str {
    match source.rsplit_once(':') {
        Some((name, "ro" | "rw")) => name,
        _ => source,
    }
}
