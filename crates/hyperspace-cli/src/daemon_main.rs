//! `hyperspaced`: runs the coordination service with no CLI frontend,
//! for process managers that want a dedicated daemon binary rather than
//! `hyperspace daemon`.

use anyhow::{Context, Result};
use clap::Parser;
use hyperspace_config::Config;

#[derive(Parser)]
#[command(name = "hyperspaced")]
#[command(author, version, about = "Hyperspace coordination service daemon", long_about = None)]
struct Args {
    /// Path to a `hyperspace.toml` config file.
    #[arg(long, env = "HYPERSPACE_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Enable verbose (`debug`) logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    let _guard = hyperspace_telemetry::setup_logging(&hyperspace_telemetry::LogConfig::new(level))
        .context("failed to initialise logging")?;

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    hyperspace_server::run(config).await.context("daemon exited with an error")
}
