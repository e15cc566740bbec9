//! Collector configuration
//!
//! Values come from built-in defaults, then an optional YAML file, then
//! command-line flags, each layer overriding the previous one. `DOCKER_HOST`
//! is part of the defaults layer, so a configured `endpoint` wins over it.

use crate::daemon::CycleOptions;
use crate::error::{GcError, Result};
use crate::image::ImageFilter;
use crate::runtime::client::DEFAULT_REQUEST_TIMEOUT;
use crate::runtime::{Endpoint, DEFAULT_ENDPOINT};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default maximum age of containers and images: four weeks
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(4 * 7 * 24 * 60 * 60);

/// Environment variable naming the engine address
pub const DOCKER_HOST_ENV: &str = "DOCKER_HOST";

/// Config file looked up when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Collector configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "snake_case", deny_unknown_fields)]
pub struct GcConfig {
    /// Address of the engine API
    pub endpoint: String,
    /// Containers created or exited within this age are kept
    #[serde(deserialize_with = "duration")]
    pub max_container_age: Duration,
    /// Images created within this age are kept
    #[serde(deserialize_with = "duration")]
    pub max_image_age: Duration,
    /// Pause between cycles; zero runs a single cycle
    #[serde(deserialize_with = "duration")]
    pub interval: Duration,
    /// Classify and report only
    pub dry_run: bool,
    /// Also remove containers without a recorded finish time
    #[serde(rename = "unsafe")]
    pub unsafe_mode: bool,
    /// Debug logging
    pub verbose: bool,
    /// Pin the engine API version, e.g. `1.41`
    pub api_version: Option<String>,
    /// Per-request timeout
    #[serde(deserialize_with = "duration")]
    pub request_timeout: Duration,
    /// Tag patterns of images that are never removed
    pub protected_images: Vec<String>,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(std::env::var(DOCKER_HOST_ENV).ok()),
            max_container_age: DEFAULT_MAX_AGE,
            max_image_age: DEFAULT_MAX_AGE,
            interval: Duration::ZERO,
            dry_run: false,
            unsafe_mode: false,
            verbose: false,
            api_version: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            protected_images: Vec::new(),
        }
    }
}

impl GcConfig {
    /// Default config file location, `<config dir>/rune-gc/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rune-gc").join(DEFAULT_CONFIG_FILE))
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GcError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| GcError::Yaml(e.to_string()))
    }

    /// Load the given file, or the default file when it exists, or defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Check values that cannot be checked while deserializing
    pub fn validate(&self) -> Result<()> {
        self.endpoint()?;
        ImageFilter::new(&self.protected_images)?;
        if self.request_timeout.is_zero() {
            return Err(GcError::InvalidConfig(
                "request_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed engine endpoint
    pub fn endpoint(&self) -> Result<Endpoint> {
        self.endpoint.parse()
    }

    /// Per-cycle options derived from this configuration
    pub fn cycle_options(&self) -> Result<CycleOptions> {
        Ok(CycleOptions {
            max_container_age: self.max_container_age,
            max_image_age: self.max_image_age,
            allow_missing_finish_time: self.unsafe_mode,
            dry_run: self.dry_run,
            image_filter: ImageFilter::new(&self.protected_images)?,
        })
    }
}

/// `DOCKER_HOST` when set and non-empty, else the local socket
fn default_endpoint(docker_host: Option<String>) -> String {
    docker_host
        .filter(|host| !host.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
}

/// Parse a duration such as `672h`, `1h30m`, `90s`, `28d` or `4w`.
///
/// Units: `ms`, `s`, `m`, `h`, `d`, `w`. A bare integer is seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(GcError::InvalidDuration(input.to_string()));
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let invalid = || GcError::InvalidDuration(input.to_string());
    let mut total = Duration::ZERO;
    let mut rest = s;

    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let millis_per_unit: u64 = match &rest[..unit_len] {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60 * 1_000,
            "h" => 60 * 60 * 1_000,
            "d" => 24 * 60 * 60 * 1_000,
            "w" => 7 * 24 * 60 * 60 * 1_000,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];

        let millis = value.checked_mul(millis_per_unit).ok_or_else(invalid)?;
        total = total
            .checked_add(Duration::from_millis(millis))
            .ok_or_else(invalid)?;
    }

    Ok(total)
}

/// Accepts either a duration string or an integer number of seconds
fn duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}
