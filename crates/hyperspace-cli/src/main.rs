//! `hyperspace`: an administrative command-line client for the
//! coordination service (`spec.md` §4.6, the operations exposed over the
//! request channel).
//!
//! Each invocation is a short-lived session: it dials the master,
//! performs the one operation the subcommand names, and exits. Commands
//! that operate on extended attributes or locks open the target node
//! themselves and close it again before returning.

use std::net::{SocketAddr, ToSocketAddrs};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hyperspace_client::{Client, ReconnectPolicy};
use hyperspace_config::Config;

mod commands;

use commands::LockArg;

#[derive(Parser)]
#[command(name = "hyperspace")]
#[command(author, version, about = "Administrative client for the Hyperspace coordination service", long_about = None)]
struct Cli {
    /// Path to a `hyperspace.toml` config file. Only `Hyperspace.Master.*`
    /// is consulted; everything else is server-side configuration.
    #[arg(long, global = true, env = "HYPERSPACE_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Master address, overriding the config file (`host:port`).
    #[arg(long, global = true, env = "HYPERSPACE_MASTER")]
    master: Option<String>,

    /// Enable verbose (`debug`) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an interior node without opening it.
    Mkdir {
        /// Absolute node path, e.g. `/ls/cell/app/lock`.
        path: String,
    },
    /// Remove a node.
    Unlink {
        /// Absolute node path.
        path: String,
    },
    /// Test whether a node exists.
    Exists {
        /// Absolute node path.
        path: String,
    },
    /// List the children of a node.
    Readdir {
        /// Absolute node path.
        path: String,
    },
    /// Read an extended attribute.
    AttrGet {
        /// Absolute node path.
        path: String,
        /// Attribute name.
        name: String,
    },
    /// Set an extended attribute.
    AttrSet {
        /// Absolute node path.
        path: String,
        /// Attribute name.
        name: String,
        /// Attribute value, stored as raw UTF-8 bytes.
        value: String,
    },
    /// Delete an extended attribute.
    AttrDel {
        /// Absolute node path.
        path: String,
        /// Attribute name.
        name: String,
    },
    /// List the extended attributes on a node.
    AttrList {
        /// Absolute node path.
        path: String,
    },
    /// Acquire a lock on a node and report the outcome.
    Lock {
        /// Absolute node path.
        path: String,
        /// `shared` or `exclusive`.
        #[arg(long, value_enum, default_value = "exclusive")]
        mode: LockArg,
        /// Fail immediately instead of waiting if the lock is held.
        #[arg(long)]
        try_lock: bool,
    },
    /// Query master liveness and the base-directory generation counter.
    Status,
    /// Run the coordination service daemon in the foreground.
    Daemon,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let _guard = hyperspace_telemetry::setup_logging(&hyperspace_telemetry::LogConfig::new(level))
        .context("failed to initialise logging")?;

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    if let Commands::Daemon = cli.command {
        return hyperspace_server::run(config).await.context("daemon exited with an error");
    }

    let server_addr = resolve_master(cli.master.as_deref(), &config)?;
    let client = Client::connect(
        server_addr,
        "hyperspace-cli",
        config.keep_alive_interval(),
        config.lease_interval(),
        config.grace_period(),
        ReconnectPolicy::NoReconnect,
    )
    .await
    .context("failed to establish a session with the master")?;

    match cli.command {
        Commands::Mkdir { path } => commands::mkdir(&client, &path).await,
        Commands::Unlink { path } => commands::unlink(&client, &path).await,
        Commands::Exists { path } => commands::exists(&client, &path).await,
        Commands::Readdir { path } => commands::readdir(&client, &path).await,
        Commands::AttrGet { path, name } => commands::attr_get(&client, &path, &name).await,
        Commands::AttrSet { path, name, value } => commands::attr_set(&client, &path, &name, value).await,
        Commands::AttrDel { path, name } => commands::attr_del(&client, &path, &name).await,
        Commands::AttrList { path } => commands::attr_list(&client, &path).await,
        Commands::Lock { path, mode, try_lock } => commands::lock(&client, &path, mode.into(), try_lock).await,
        Commands::Status => commands::status(&client).await,
        Commands::Daemon => unreachable!("handled above in the daemon fast path"),
    }
}

fn resolve_master(override_addr: Option<&str>, config: &Config) -> Result<SocketAddr> {
    let raw = match override_addr {
        Some(addr) => addr.to_owned(),
        None => format!("{}:{}", config.hyperspace.master.host, config.hyperspace.master.port),
    };
    raw.to_socket_addrs()
        .with_context(|| format!("could not resolve master address {raw}"))?
        .next()
        .with_context(|| format!("master address {raw} resolved to no addresses"))
}
