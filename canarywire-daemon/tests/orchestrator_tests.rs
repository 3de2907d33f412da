//! Orchestrator construction tests.
//!
//! Verifies configuration loading, validation failures, and pipeline
//! assembly. The signal-driven run loop is exercised manually and in
//! deployment smoke tests, not here.

use std::path::PathBuf;

use canarywire_core::config::CanarywireConfig;
use canarywire_core::pipeline::HealthStatus;
use canarywire_daemon::orchestrator::Orchestrator;
use tempfile::TempDir;

/// Config pointing every path at a temp directory, metrics disabled
/// (installing the global recorder would leak across tests).
fn test_config(data_dir: &TempDir, watch_dir: &TempDir) -> CanarywireConfig {
    let mut config = CanarywireConfig::default();
    config.general.data_dir = data_dir.path().display().to_string();
    config.watcher.watch_dir = watch_dir.path().display().to_string();
    config
}

#[tokio::test]
async fn build_from_config_assembles_pipeline() {
    let data_dir = TempDir::new().expect("should create temp dir");
    let watch_dir = TempDir::new().expect("should create temp dir");

    let orchestrator = Orchestrator::build_from_config(test_config(&data_dir, &watch_dir))
        .await
        .expect("should build orchestrator");

    // Pipeline is assembled but not yet started
    let health = orchestrator.health().await;
    assert!(matches!(health, HealthStatus::Unhealthy(ref reason) if reason == "not started"));
}

#[tokio::test]
async fn build_from_config_rejects_invalid_config() {
    let data_dir = TempDir::new().expect("should create temp dir");
    let watch_dir = TempDir::new().expect("should create temp dir");

    let mut config = test_config(&data_dir, &watch_dir);
    config.delivery.queue_capacity = 0;

    let err = Orchestrator::build_from_config(config)
        .await
        .expect_err("zero queue capacity should be rejected");
    assert!(err.to_string().contains("validation failed"));
}

#[tokio::test]
async fn build_loads_config_from_file() {
    let data_dir = TempDir::new().expect("should create temp dir");
    let watch_dir = TempDir::new().expect("should create temp dir");
    let config_dir = TempDir::new().expect("should create temp dir");

    let config_path = config_dir.path().join("canarywire.toml");
    let toml = format!(
        r#"
[general]
log_level = "debug"
hostname = "honeypot-42"
data_dir = "{}"

[watcher]
watch_dir = "{}"

[delivery]
tcp_port = 6514
"#,
        data_dir.path().display(),
        watch_dir.path().display()
    );
    std::fs::write(&config_path, toml).expect("should write config file");

    let orchestrator = Orchestrator::build(&config_path)
        .await
        .expect("should build from file");

    let config = orchestrator.config();
    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.general.hostname, "honeypot-42");
    assert_eq!(config.delivery.tcp_port, 6514);
    // Unspecified fields fall back to defaults
    assert_eq!(config.delivery.udp_port, 12105);
}

#[tokio::test]
async fn build_fails_for_missing_config_file() {
    let path = PathBuf::from("/nonexistent/canarywire.toml");

    let err = Orchestrator::build(&path)
        .await
        .expect_err("missing config file should fail");
    assert!(err.to_string().contains("failed to load config"));
}

#[tokio::test]
async fn build_fails_for_malformed_config_file() {
    let config_dir = TempDir::new().expect("should create temp dir");
    let config_path = config_dir.path().join("canarywire.toml");
    std::fs::write(&config_path, "[general\nlog_level = \"info\"").expect("should write file");

    let err = Orchestrator::build(&config_path)
        .await
        .expect_err("malformed TOML should fail");
    assert!(err.to_string().contains("failed to load config"));
}

#[tokio::test]
async fn build_from_config_creates_data_dir() {
    let base = TempDir::new().expect("should create temp dir");
    let watch_dir = TempDir::new().expect("should create temp dir");

    let mut config = CanarywireConfig::default();
    let nested = base.path().join("state").join("canarywire");
    config.general.data_dir = nested.display().to_string();
    config.watcher.watch_dir = watch_dir.path().display().to_string();

    Orchestrator::build_from_config(config)
        .await
        .expect("should build orchestrator");

    assert!(nested.is_dir(), "data_dir should be created on build");
}
