use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fiscus_domain::config::{Config, ConfigSeverity};
use fiscus_gateway::cli::{Cli, Command, ConfigCommand};
use fiscus_gateway::runtime::scheduler::SchedulerHandle;
use fiscus_gateway::{bootstrap, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let config = fiscus_gateway::cli::load_config(&cli.config)?;
            run_server(Arc::new(config), cli.offline).await
        }
        Some(Command::Config(args)) => {
            let config = fiscus_gateway::cli::load_config(&cli.config)?;
            match args.command {
                ConfigCommand::Validate => {
                    let issues = config.validate();
                    for issue in &issues {
                        println!("{:?}: {issue}", issue.severity);
                    }
                    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
                        std::process::exit(1);
                    }
                    println!("configuration ok");
                    Ok(())
                }
                ConfigCommand::Show => {
                    println!("{}", toml::to_string_pretty(&config)?);
                    Ok(())
                }
            }
        }
        Some(Command::Version) => {
            println!("fiscus {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,fiscus_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: Arc<Config>, offline: bool) -> anyhow::Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "fiscus starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── State & background services ──────────────────────────────────
    let state = bootstrap::build_state(config, offline)?;
    let _scheduler = SchedulerHandle::start(&state);

    server::serve(state).await
}
