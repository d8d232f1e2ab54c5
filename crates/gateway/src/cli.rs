//! Command-line interface for the `fiscus` binary.

use clap::{Parser, Subcommand};

use fiscus_domain::config::Config;
use fiscus_domain::error::{Error, Result};

#[derive(Parser)]
#[command(name = "fiscus", about = "Back-office agent orchestration gateway")]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "fiscus.toml")]
    pub config: String,

    /// Run without LLM credentials (scripted provider).
    #[arg(long)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the gateway (default).
    Serve,
    /// Inspect or validate the configuration.
    Config(ConfigArgs),
    /// Print the version.
    Version,
}

#[derive(Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Check the config file and report issues.
    Validate,
    /// Print the effective configuration.
    Show,
}

/// Load the config file. A missing file yields defaults, matching the
/// all-defaults TOML.
pub fn load_config(path: &str) -> Result<Config> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Config::from_toml_str(&raw),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path, "config file not found, using defaults");
            Ok(Config::default())
        }
        Err(e) => Err(Error::Io(e)),
    }
}
