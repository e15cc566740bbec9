//! Polling loop driving the collection cycles

use super::cycle::{run_cycle, CycleOptions, Summary};
use crate::config::GcConfig;
use crate::error::Result;
use crate::runtime::{ContainerRuntime, DockerClient};
use chrono::Utc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Runs collection cycles against a runtime, once or on an interval
pub struct GcDaemon<R> {
    runtime: R,
    options: CycleOptions,
    interval: Duration,
}

impl GcDaemon<DockerClient> {
    /// Build a daemon talking to the engine named in `config`
    pub fn from_config(config: &GcConfig) -> Result<Self> {
        config.validate()?;

        let mut client = DockerClient::new(config.endpoint()?)?.timeout(config.request_timeout);
        if let Some(version) = &config.api_version {
            client = client.api_version(version);
        }

        Ok(Self::new(client, config.cycle_options()?, config.interval))
    }
}

impl<R: ContainerRuntime> GcDaemon<R> {
    pub fn new(runtime: R, options: CycleOptions, interval: Duration) -> Self {
        Self {
            runtime,
            options,
            interval,
        }
    }

    /// Get the runtime
    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Run a single cycle at the current time
    pub async fn run_once(&self) -> Result<Summary> {
        let summary = run_cycle(&self.runtime, Utc::now(), &self.options).await?;
        summary.log();
        Ok(summary)
    }

    /// Run cycles until the interval is zero, a cycle fails, or a shutdown
    /// signal arrives.
    ///
    /// A failed cycle ends the loop with its error; restarting is left to
    /// the process supervisor.
    pub async fn run(&self) -> Result<()> {
        match self.runtime.ping().await? {
            Some(version) => info!("Connected to container engine (API {})", version),
            None => info!("Connected to container engine"),
        }
        if self.options.dry_run {
            warn!("Dry run: nothing will be removed");
        }

        loop {
            if let Err(e) = self.run_once().await {
                error!("Cleanup cycle failed: {}", e);
                return Err(e);
            }

            if self.interval.is_zero() {
                return Ok(());
            }

            info!("Sleeping for {:?}", self.interval);
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown_signal() => {
                    info!("Shutdown signal received, exiting");
                    return Ok(());
                }
            }
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
