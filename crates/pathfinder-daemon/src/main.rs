//! Pathfinder daemon: a service-discovery server speaking the newline-JSON
//! protocol defined in `pathfinder-core`.

use anyhow::{Context, Result};
use clap::Parser;
use pathfinder_core::Config;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use pathfinder_daemon::{run_server, shutdown::graceful_shutdown};

/// Pathfinder daemon - service discovery and pub/sub catalogue
#[derive(Parser, Debug)]
#[command(name = "pathfinder-daemon")]
#[command(about = "Service discovery and pub/sub daemon")]
#[command(version)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the listen address from the config file
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(log_level).with_target(false).init();

    info!("pathfinder daemon starting");

    let config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    }
    .with_bind_addr_override(args.bind);

    let cancel = CancellationToken::new();
    let cancel_for_signals = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => info!("received SIGINT"),
                _ = sigterm.recv() => info!("received SIGTERM"),
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.expect("failed to listen for Ctrl+C");
            info!("received Ctrl+C");
        }

        cancel_for_signals.cancel();
    });

    let server_cancel = cancel.clone();
    let server_task = tokio::spawn(run_server(config, server_cancel));

    cancel.cancelled().await;
    graceful_shutdown(cancel, server_task, Duration::from_secs(5)).await?;

    info!("pathfinder daemon shutdown complete");
    Ok(())
}
