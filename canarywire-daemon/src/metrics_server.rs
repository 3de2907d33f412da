//! Prometheus metrics HTTP server.
//!
//! Uses the built-in HTTP listener from `metrics-exporter-prometheus`
//! to expose a `/metrics` scrape endpoint.

use std::net::SocketAddr;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;

use canarywire_core::config::MetricsConfig;

/// Install the global metrics recorder and start the HTTP listener.
///
/// Must be called once per process, before the pipeline records any
/// metrics. Afterwards every `metrics::counter!()` / `metrics::gauge!()`
/// call in the workspace is exported in Prometheus format.
///
/// # Errors
///
/// - `listen_addr` is not a valid socket address
/// - Socket binding fails
/// - A global recorder is already installed
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr: SocketAddr = config.listen_addr.parse().map_err(|e| {
        anyhow::anyhow!(
            "invalid metrics listen address '{}': {}",
            config.listen_addr,
            e
        )
    })?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    // Register HELP text for every metric in the workspace
    canarywire_core::metrics::describe_all();

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");

    Ok(())
}
