//! rune-gc - garbage collector for Docker-compatible container engines
//!
//! This is the main CLI entry point for rune-gc.

use clap::Parser;
use rune_gc::config::parse_duration;
use rune_gc::error::Result;
use rune_gc::{GcConfig, GcDaemon};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// rune-gc - remove expired containers and images
#[derive(Parser)]
#[command(name = "rune-gc")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Remove expired containers and images from a Docker-compatible host", long_about = None)]
struct Cli {
    /// Address of the engine API (unix://PATH, tcp://HOST:PORT, http(s)://...);
    /// overrides the config file and DOCKER_HOST
    #[arg(short = 'a', long = "addr")]
    addr: Option<String>,

    /// Max container age, e.g. 672h or 28d
    #[arg(long = "container-age", visible_alias = "ca", value_parser = parse_cli_duration)]
    container_age: Option<Duration>,

    /// Max image age, e.g. 672h or 28d
    #[arg(long = "image-age", visible_alias = "ia", value_parser = parse_cli_duration)]
    image_age: Option<Duration>,

    /// Run continuously with this pause between cycles (0 runs once)
    #[arg(short = 'r', long = "interval", value_parser = parse_cli_duration)]
    interval: Option<Duration>,

    /// Dry run; do not actually delete
    #[arg(long = "dry-run", visible_alias = "dry")]
    dry_run: bool,

    /// Unsafe; delete containers without a recorded finish time
    #[arg(short = 'u', long = "unsafe")]
    unsafe_mode: bool,

    /// Be verbose
    #[arg(short, long)]
    verbose: bool,

    /// Config file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pin the engine API version, e.g. 1.41
    #[arg(long)]
    api_version: Option<String>,

    /// Per-request timeout
    #[arg(long, value_parser = parse_cli_duration)]
    timeout: Option<Duration>,

    /// Never remove images with a tag matching this regex (repeatable)
    #[arg(long = "protect-image")]
    protect_image: Vec<String>,
}

fn parse_cli_duration(s: &str) -> std::result::Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

impl Cli {
    /// Layer command-line flags over the loaded configuration
    fn apply(self, mut config: GcConfig) -> GcConfig {
        if let Some(addr) = self.addr {
            config.endpoint = addr;
        }
        if let Some(age) = self.container_age {
            config.max_container_age = age;
        }
        if let Some(age) = self.image_age {
            config.max_image_age = age;
        }
        if let Some(interval) = self.interval {
            config.interval = interval;
        }
        if let Some(version) = self.api_version {
            config.api_version = Some(version);
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout = timeout;
        }
        config.dry_run |= self.dry_run;
        config.unsafe_mode |= self.unsafe_mode;
        config.verbose |= self.verbose;
        config.protected_images.extend(self.protect_image);
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = GcConfig::load(cli.config.as_deref())?;
    let config = cli.apply(config);

    // Initialize logging
    let level = if config.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let daemon = GcDaemon::from_config(&config)?;
    daemon.run().await
}
