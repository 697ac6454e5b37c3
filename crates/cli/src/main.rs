//! # Vigil
//!
//! Host-resident application firewall: per-flow verdicts driven by a
//! layered policy engine over process attribution and DNS linkage.

use clap::Parser;
use std::path::PathBuf;

use vigil_domain::CliOverrides;

mod bootstrap;
mod collaborators;
mod di;
mod server;

#[derive(Parser)]
#[command(name = "vigil")]
#[command(version)]
#[command(about = "Host-resident application firewall core")]
struct Cli {
    /// Path to the configuration file
    #[arg(short = 'c', long, default_value = "vigil.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Database file path
    #[arg(long)]
    db: Option<String>,

    /// Binary whose API access bypasses path checks (repeatable)
    #[arg(long = "allowed-clients")]
    allowed_clients: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let overrides = CliOverrides {
        log_level: cli.log_level,
        db_path: cli.db,
        allowed_clients: cli.allowed_clients,
    };

    let config = bootstrap::load_config(&cli.config, &overrides)?;
    bootstrap::init_logging(&config);

    tracing::info!(config = %cli.config.display(), "Vigil starting");

    let container = di::Container::build(config, overrides).await?;
    server::run(container).await?;

    tracing::info!("Vigil stopped");
    Ok(())
}
