//! CLI argument definitions for canarywire-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use canarywire_core::config::CanarywireConfig;

/// Canarywire honeypot event shipping daemon.
///
/// Tails honeypot log files, enriches events with threat reputation
/// verdicts, and ships them to a central collector over TCP or UDP.
#[derive(Parser, Debug)]
#[command(name = "canarywire-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to canarywire.toml configuration file.
    #[arg(short, long, default_value = "/etc/canarywire/canarywire.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}

impl DaemonCli {
    /// Apply CLI overrides onto a loaded configuration.
    ///
    /// CLI arguments have the highest precedence: they win over both
    /// the config file and `CANARYWIRE_*` environment variables. The
    /// caller must re-validate the configuration afterwards.
    pub fn apply_overrides(&self, config: &mut CanarywireConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file = pid_file.clone();
        }
    }
}
