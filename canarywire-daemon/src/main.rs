//! canarywire-daemon entry point.
//!
//! Parses CLI arguments, loads configuration, initializes logging,
//! and hands control to the [`Orchestrator`].

use std::process::ExitCode;

use clap::Parser;

use canarywire_core::config::CanarywireConfig;
use canarywire_daemon::cli::DaemonCli;
use canarywire_daemon::logging;
use canarywire_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = DaemonCli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Logging may not be initialized yet, so report on stderr
            eprintln!("canarywire-daemon: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: DaemonCli) -> anyhow::Result<()> {
    let mut config = CanarywireConfig::load(&cli.config).await.map_err(|e| {
        anyhow::anyhow!("failed to load config from {}: {}", cli.config.display(), e)
    })?;

    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "canarywire-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await
}
