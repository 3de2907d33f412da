//! Pipeline assembly and daemon lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `canarywire-daemon`.
//! It loads configuration, installs the metrics recorder, builds the
//! shipping pipeline, writes the PID file, and runs the main loop until
//! a shutdown signal arrives.
//!
//! # Lifecycle
//!
//! 1. Load and validate `canarywire.toml`
//! 2. Install the Prometheus recorder (if enabled)
//! 3. Build the shipping pipeline
//! 4. Write the PID file (if configured)
//! 5. Start the pipeline, report health periodically
//! 6. On SIGTERM/SIGINT: stop the pipeline, remove the PID file

use std::path::Path;
use std::time::Instant;

use anyhow::Result;

use canarywire_core::config::CanarywireConfig;
use canarywire_core::pipeline::{HealthStatus, Pipeline};
use canarywire_shipper::config::ShipperConfig;
use canarywire_shipper::pipeline::ShipperPipeline;

use crate::metrics_server;

/// Seconds between periodic pipeline health checks.
const HEALTH_CHECK_INTERVAL_SECS: u64 = 10;

/// The main daemon orchestrator.
///
/// Owns the single shipping pipeline and manages its complete
/// lifecycle: configuration loading, startup, health monitoring,
/// and graceful shutdown.
#[derive(Debug)]
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: CanarywireConfig,
    /// The honeypot event shipping pipeline.
    pipeline: ShipperPipeline,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration from a file and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or
    /// parsed, validation fails, or the pipeline fails to initialize.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = CanarywireConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// Useful for testing or when CLI overrides have been applied
    /// after loading.
    pub async fn build_from_config(config: CanarywireConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        // Install the metrics recorder before the pipeline records anything
        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            record_build_info();
        }

        let shipper_config = ShipperConfig::from_core(&config);
        let pipeline = ShipperPipeline::builder()
            .config(shipper_config)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build shipping pipeline: {}", e))?;

        tracing::info!("orchestrator initialized");

        Ok(Self {
            config,
            pipeline,
            start_time: Instant::now(),
        })
    }

    /// Start the pipeline and block until a shutdown signal is received.
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM` (from systemd, Docker, or `kill`)
    /// - `SIGINT` (Ctrl+C)
    pub async fn run(&mut self) -> Result<()> {
        if let Some(path) = self.pid_file_path() {
            write_pid_file(&path)?;
        }

        tracing::info!("starting shipping pipeline");
        if let Err(e) = self.pipeline.start().await {
            tracing::error!(error = %e, "pipeline startup failed");
            if let Some(path) = self.pid_file_path() {
                remove_pid_file(&path);
            }
            return Err(e.into());
        }

        let signal = self.monitor_until_shutdown().await?;
        tracing::info!(signal, "shutdown signal received");

        let stop_result = self.pipeline.stop().await;

        if let Some(path) = self.pid_file_path() {
            remove_pid_file(&path);
        }

        stop_result.map_err(|e| anyhow::anyhow!("pipeline shutdown failed: {}", e))?;
        tracing::info!("canarywire-daemon shut down");
        Ok(())
    }

    /// Main loop: report pipeline health on an interval until
    /// SIGTERM or SIGINT arrives. Returns the signal name.
    async fn monitor_until_shutdown(&self) -> Result<&'static str> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

        let mut health_interval = tokio::time::interval(tokio::time::Duration::from_secs(
            HEALTH_CHECK_INTERVAL_SECS,
        ));
        health_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!("entering main event loop");
        loop {
            tokio::select! {
                _ = sigterm.recv() => return Ok("SIGTERM"),
                _ = sigint.recv() => return Ok("SIGINT"),
                _ = health_interval.tick() => self.report_health().await,
            }
        }
    }

    /// Check pipeline health, update the uptime gauge, and log the result.
    async fn report_health(&self) {
        let health = self.pipeline.health_check().await;
        let uptime_secs = self.start_time.elapsed().as_secs();

        if self.config.metrics.enabled {
            use canarywire_core::metrics as m;
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
        }

        match &health {
            HealthStatus::Healthy => {
                tracing::debug!(uptime_secs, "pipeline healthy");
            }
            HealthStatus::Degraded(reason) => {
                tracing::warn!(uptime_secs, reason = %reason, "pipeline degraded");
            }
            HealthStatus::Unhealthy(reason) => {
                tracing::error!(uptime_secs, reason = %reason, "pipeline unhealthy");
            }
        }
    }

    /// Get the current pipeline health status.
    pub async fn health(&self) -> HealthStatus {
        self.pipeline.health_check().await
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &CanarywireConfig {
        &self.config
    }

    /// PID file path, or `None` when not configured.
    fn pid_file_path(&self) -> Option<std::path::PathBuf> {
        if self.config.general.pid_file.is_empty() {
            None
        } else {
            Some(std::path::PathBuf::from(&self.config.general.pid_file))
        }
    }
}

/// Write the current process PID to a file.
///
/// Used to prevent duplicate daemon instances. The file is created
/// atomically with `create_new(true)`, verified to be a regular file,
/// and restricted to mode 0o600; its parent directory is created with
/// mode 0o700.
///
/// # Errors
///
/// Returns an error if the file already exists (another instance may
/// be running) or cannot be written.
fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = fs::DirBuilder::new();
            builder.mode(0o700).recursive(true);
            builder.create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    // Reject symlinks and other special files
    let metadata = file.metadata()?;
    if !metadata.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        file.set_permissions(permissions)?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove PID file"
        );
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

/// Record the build info gauge (always 1, with version label).
fn record_build_info() {
    use canarywire_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        "daemon build info recorded"
    );
}
