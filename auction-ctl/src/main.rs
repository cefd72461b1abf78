//! `auction-ctl`: loads a TOML schedule, runs the coordinator, and reports
//! a process exit code (§6, §9's CLI expansion).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use auction_scheduler::Coordinator;
use clap::Parser;
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "auction-ctl", about = "Run a configured auction coordination session")]
struct Cli {
    /// Path to the TOML configuration file (schedule + coordinator settings).
    #[arg(short, long, default_value = "auction.toml")]
    config: PathBuf,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn load_config(path: &std::path::Path) -> anyhow::Result<auction_scheduler::config::RawConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path.to_path_buf()))
        .add_source(config::Environment::with_prefix("AUCTION").separator("__"))
        .build()
        .with_context(|| format!("loading configuration from {}", path.display()))?;

    let raw: auction_scheduler::config::RawConfig =
        settings.try_deserialize().context("deserializing auction coordinator configuration")?;
    raw.validate().context("validating auction coordinator configuration")?;
    Ok(raw)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "auction-ctl exiting with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let raw = load_config(&cli.config)?;

    let coordinator = Coordinator::new(raw.coordinator, raw.tasks);
    coordinator.run().await.context("running the auction coordinator")?;
    Ok(())
}
