//! Container expiry decisions
//!
//! Classification runs in two passes. The first pass inspects every
//! container, counts image users and volume-source references, and collects
//! the containers that are old enough to go. Only once every container has
//! been counted can the second pass tell which of those candidates are still
//! mounted by a survivor; those are kept.
//!
//! A container that is listed but cannot be inspected still counts as a
//! user of the image reported in the listing. Unless the engine says it is
//! gone, its volume sources are unknown and no candidate is removed.

use super::record::ContainerRecord;
use crate::error::Result;
use crate::runtime::{ContainerRuntime, ContainerSummary};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Image ID mapped to the names of the containers using it.
///
/// Built from every container before any of them is marked expired, then
/// released per expired container, so after classification it answers
/// "who still uses this image once this run's removals are done".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageMap {
    users: HashMap<String, Vec<String>>,
}

impl UsageMap {
    /// Record `container` as a user of `image`
    pub fn add(&mut self, image: &str, container: &str) {
        self.users
            .entry(image.to_string())
            .or_default()
            .push(container.to_string());
    }

    /// Drop one occurrence of `container` from the users of `image`
    pub fn release(&mut self, image: &str, container: &str) {
        if let Some(users) = self.users.get_mut(image) {
            if let Some(pos) = users.iter().position(|u| u == container) {
                users.remove(pos);
            }
        }
    }

    /// Containers still using `image`
    pub fn users(&self, image: &str) -> &[String] {
        self.users.get(image).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any container still uses `image`
    pub fn is_used(&self, image: &str) -> bool {
        !self.users(image).is_empty()
    }
}

/// Container name mapped to how many containers mount volumes from it
#[derive(Debug, Clone, Default)]
pub struct VolumeRefCount {
    counts: HashMap<String, i64>,
}

impl VolumeRefCount {
    pub fn add_reference(&mut self, name: &str) {
        *self.counts.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn remove_reference(&mut self, name: &str) {
        if let Some(count) = self.counts.get_mut(name) {
            *count = (*count - 1).max(0);
        }
    }

    pub fn ref_count(&self, name: &str) -> i64 {
        self.counts.get(name).copied().unwrap_or(0)
    }

    /// A pinned container is a volume source of some surviving container
    pub fn is_pinned(&self, name: &str) -> bool {
        self.ref_count(name) > 0
    }
}

/// Why a container survives the first pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Running,
    MissingFinishTime,
    TooYoung,
    RecentlyExited,
}

impl std::fmt::Display for Retention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Retention::Running => write!(f, "running"),
            Retention::MissingFinishTime => write!(f, "no recorded finish time"),
            Retention::TooYoung => write!(f, "created too recently"),
            Retention::RecentlyExited => write!(f, "exited too recently"),
        }
    }
}

/// Outcome of classifying the container set
#[derive(Debug, Clone, Default)]
pub struct ContainerClassification {
    /// Containers to remove
    pub expired: Vec<ContainerRecord>,
    /// Image users that survive the removals
    pub usage: UsageMap,
    /// Containers successfully inspected and classified
    pub evaluated: usize,
    /// Containers skipped because inspection failed
    pub inspect_failures: usize,
    /// Old enough, but kept as a (possible) volume source of a survivor
    pub pinned: usize,
}

/// Oldest timestamp that is still "within `max_age` of `now`"
pub(crate) fn cutoff(now: DateTime<Utc>, max_age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// First-pass age and state checks for a single container
pub fn retention(
    record: &ContainerRecord,
    cutoff: DateTime<Utc>,
    allow_missing_finish_time: bool,
) -> Option<Retention> {
    if record.running {
        return Some(Retention::Running);
    }
    if record.finished.is_none() && !allow_missing_finish_time {
        return Some(Retention::MissingFinishTime);
    }
    if record.created > cutoff {
        return Some(Retention::TooYoung);
    }
    match record.finished {
        Some(finished) if finished > cutoff => Some(Retention::RecentlyExited),
        _ => None,
    }
}

/// Decide which containers are expired.
///
/// Inspection failures skip the container only. A malformed timestamp
/// aborts the whole classification.
pub async fn classify_containers<R: ContainerRuntime>(
    runtime: &R,
    containers: &[ContainerSummary],
    now: DateTime<Utc>,
    max_age: Duration,
    allow_missing_finish_time: bool,
) -> Result<ContainerClassification> {
    let cutoff = cutoff(now, max_age);
    let mut result = ContainerClassification::default();
    let mut volume_refs = VolumeRefCount::default();
    let mut candidates = Vec::new();
    let mut sources_unknown = false;

    for summary in containers {
        let inspect = match runtime.inspect_container(&summary.id).await {
            Ok(inspect) => inspect,
            Err(e) => {
                warn!("Skipping container {}: {}", summary.display_name(), e);
                result.inspect_failures += 1;
                if !summary.image_id.is_empty() {
                    result.usage.add(&summary.image_id, summary.display_name());
                }
                sources_unknown |= !e.is_not_found();
                continue;
            }
        };
        let record = ContainerRecord::from_inspect(inspect)?;
        result.evaluated += 1;

        // Counted before any expiry test: a container about to go still
        // declares its dependencies until it is marked.
        result.usage.add(&record.image, &record.name);
        for source in &record.volumes_from {
            volume_refs.add_reference(source);
        }

        if let Some(reason) = retention(&record, cutoff, allow_missing_finish_time) {
            debug!("Keeping container {} ({}): {}", record.name, record.short_id(), reason);
            continue;
        }

        result.usage.release(&record.image, &record.name);
        for source in &record.volumes_from {
            volume_refs.remove_reference(source);
        }
        candidates.push(record);
    }

    if sources_unknown && !candidates.is_empty() {
        warn!(
            "Keeping {} expired container(s): volume sources of an uninspected container are unknown",
            candidates.len()
        );
        for record in &candidates {
            result.usage.add(&record.image, &record.name);
        }
        result.pinned += candidates.len();
        candidates.clear();
    }

    // A pinned candidate survives, so its own image and volume sources are
    // in use again; repeat until no candidate changes state.
    loop {
        let (pinned, rest): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| volume_refs.is_pinned(&c.name));
        candidates = rest;
        if pinned.is_empty() {
            break;
        }

        for record in &pinned {
            debug!(
                "Keeping container {} ({}): volume source of {} container(s)",
                record.name,
                record.short_id(),
                volume_refs.ref_count(&record.name)
            );
            result.usage.add(&record.image, &record.name);
            for source in &record.volumes_from {
                volume_refs.add_reference(source);
            }
        }
        result.pinned += pinned.len();
    }

    for record in &candidates {
        debug!("Container {} ({}) expired", record.name, record.short_id());
    }
    result.expired = candidates;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::{container, FakeRuntime};
    use chrono::TimeZone;

    const FOUR_WEEKS: Duration = Duration::from_secs(28 * 24 * 60 * 60);

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 9, 30, 0, 0, 0).unwrap()
    }

    fn days_ago(days: i64) -> DateTime<Utc> {
        now() - chrono::Duration::days(days)
    }

    fn old_exited(id: &str, name: &str, image: &str, volumes_from: &[&str]) -> crate::runtime::ContainerInspect {
        container(id, name, image, days_ago(60), false, Some(days_ago(40)), volumes_from)
    }

    async fn classify(runtime: &FakeRuntime, unsafe_mode: bool) -> ContainerClassification {
        let summaries = runtime.list_containers(true).await.unwrap();
        classify_containers(runtime, &summaries, now(), FOUR_WEEKS, unsafe_mode)
            .await
            .unwrap()
    }

    fn expired_names(result: &ContainerClassification) -> Vec<&str> {
        let mut names: Vec<&str> = result.expired.iter().map(|c| c.name.as_str()).collect();
        names.sort();
        names
    }

    fn fixture() -> FakeRuntime {
        FakeRuntime::new(
            vec![
                container("c1", "web", "sha256:web", days_ago(60), true, None, &[]),
                container("c2", "db", "sha256:db", days_ago(60), true, None, &[]),
                container("c3", "ghost", "sha256:ghost", days_ago(60), false, None, &[]),
                old_exited("c4", "batch-a", "sha256:batch", &[]),
                old_exited("c5", "batch-b", "sha256:batch", &[]),
            ],
            vec![],
        )
    }

    #[tokio::test]
    async fn test_fixture_safe_mode() {
        let result = classify(&fixture(), false).await;
        assert_eq!(expired_names(&result), vec!["batch-a", "batch-b"]);
        assert_eq!(result.evaluated, 5);
        assert!(!result.usage.is_used("sha256:batch"));
        assert!(result.usage.is_used("sha256:ghost"));
    }

    #[tokio::test]
    async fn test_fixture_unsafe_mode() {
        let result = classify(&fixture(), true).await;
        assert_eq!(expired_names(&result), vec!["batch-a", "batch-b", "ghost"]);
        assert!(!result.usage.is_used("sha256:ghost"));
        assert_eq!(result.usage.users("sha256:web"), ["web".to_string()]);
    }

    #[tokio::test]
    async fn test_running_never_expires() {
        let runtime = FakeRuntime::new(
            vec![container("c1", "old", "sha256:a", days_ago(400), true, Some(days_ago(300)), &[])],
            vec![],
        );
        assert!(classify(&runtime, true).await.expired.is_empty());
    }

    #[tokio::test]
    async fn test_age_checks() {
        let runtime = FakeRuntime::new(
            vec![
                container("c1", "young", "sha256:a", days_ago(3), false, Some(days_ago(2)), &[]),
                container("c2", "recent-exit", "sha256:a", days_ago(60), false, Some(days_ago(2)), &[]),
                container("c3", "boundary", "sha256:a", days_ago(28), false, Some(days_ago(28)), &[]),
            ],
            vec![],
        );
        let result = classify(&runtime, false).await;
        assert_eq!(expired_names(&result), vec!["boundary"]);
        assert_eq!(result.usage.users("sha256:a").len(), 2);
    }

    #[tokio::test]
    async fn test_young_container_with_unset_finish_time_kept_in_unsafe_mode() {
        let runtime = FakeRuntime::new(
            vec![container("c1", "fresh", "sha256:a", days_ago(1), false, None, &[])],
            vec![],
        );
        assert!(classify(&runtime, true).await.expired.is_empty());
    }

    #[tokio::test]
    async fn test_volume_source_pinned_by_survivor() {
        let runtime = FakeRuntime::new(
            vec![
                old_exited("c1", "data", "sha256:data", &[]),
                container("c2", "app", "sha256:app", days_ago(60), true, None, &["data:ro"]),
            ],
            vec![],
        );
        let result = classify(&runtime, false).await;
        assert!(result.expired.is_empty());
        assert_eq!(result.pinned, 1);
        assert!(result.usage.is_used("sha256:data"));
    }

    #[tokio::test]
    async fn test_volume_source_released_by_expired_user() {
        let runtime = FakeRuntime::new(
            vec![
                old_exited("c1", "data", "sha256:data", &[]),
                old_exited("c2", "app", "sha256:app", &["data"]),
            ],
            vec![],
        );
        let result = classify(&runtime, false).await;
        assert_eq!(expired_names(&result), vec!["app", "data"]);
        assert_eq!(result.pinned, 0);
    }

    #[tokio::test]
    async fn test_pinned_candidate_keeps_its_own_sources() {
        // backup <- data <- app(running): data survives, so backup must too
        let runtime = FakeRuntime::new(
            vec![
                old_exited("c1", "backup", "sha256:backup", &[]),
                old_exited("c2", "data", "sha256:data", &["backup"]),
                container("c3", "app", "sha256:app", days_ago(60), true, None, &["data"]),
            ],
            vec![],
        );
        let result = classify(&runtime, false).await;
        assert!(result.expired.is_empty());
        assert_eq!(result.pinned, 2);
        assert!(result.usage.is_used("sha256:backup"));
    }

    #[tokio::test]
    async fn test_vanished_container_skipped() {
        let mut runtime = fixture();
        runtime.vanished.insert("c4".to_string());
        let result = classify(&runtime, false).await;
        assert_eq!(expired_names(&result), vec!["batch-b"]);
        assert_eq!(result.inspect_failures, 1);
        assert_eq!(result.evaluated, 4);
        // listed image still counts for the skipped container
        assert_eq!(result.usage.users("sha256:batch"), ["batch-a".to_string()]);
    }

    #[tokio::test]
    async fn test_uninspectable_container_holds_candidates() {
        let mut runtime = FakeRuntime::new(
            vec![
                container("c1", "web", "sha256:web", days_ago(60), true, None, &["web-data"]),
                old_exited("c2", "web-data", "sha256:data", &[]),
            ],
            vec![],
        );
        runtime.broken.insert("c1".to_string());

        let result = classify(&runtime, false).await;
        assert!(result.expired.is_empty());
        assert_eq!(result.pinned, 1);
        assert_eq!(result.inspect_failures, 1);
        assert!(result.usage.is_used("sha256:web"));
        assert!(result.usage.is_used("sha256:data"));
    }

    #[tokio::test]
    async fn test_malformed_created_aborts() {
        let mut broken = old_exited("c1", "bad", "sha256:a", &[]);
        broken.created = Some("not-a-date".to_string());
        let runtime = FakeRuntime::new(vec![broken], vec![]);
        let summaries = runtime.list_containers(true).await.unwrap();

        let err = classify_containers(&runtime, &summaries, now(), FOUR_WEEKS, false)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::GcError::MalformedTimestamp { .. }));
    }

    #[tokio::test]
    async fn test_classification_is_idempotent() {
        let runtime = fixture();
        let first = classify(&runtime, true).await;
        let second = classify(&runtime, true).await;
        assert_eq!(first.expired, second.expired);
        assert_eq!(first.usage, second.usage);
    }

    #[test]
    fn test_usage_map_release_one_occurrence() {
        let mut usage = UsageMap::default();
        usage.add("sha256:a", "web");
        usage.add("sha256:a", "web");
        usage.release("sha256:a", "web");
        assert_eq!(usage.users("sha256:a").len(), 1);
        usage.release("sha256:a", "web");
        assert!(!usage.is_used("sha256:a"));
        usage.release("sha256:missing", "web");
        assert!(!usage.is_used("sha256:missing"));
    }

    #[test]
    fn test_volume_ref_count_never_negative() {
        let mut refs = VolumeRefCount::default();
        refs.remove_reference("data");
        refs.add_reference("data");
        refs.remove_reference("data");
        refs.remove_reference("data");
        assert_eq!(refs.ref_count("data"), 0);
        assert!(!refs.is_pinned("data"));
    }

    #[test]
    fn test_cutoff_saturates() {
        assert_eq!(cutoff(now(), Duration::MAX), DateTime::<Utc>::MIN_UTC);
        assert_eq!(cutoff(now(), FOUR_WEEKS), days_ago(28));
    }
}
