//! pathfinder - CLI for a Pathfinder service-discovery daemon
//!
//! A thin, synchronous client over the daemon's newline-JSON TCP protocol:
//! publish/unpublish services, list the current catalogue, and watch a
//! filter for changes.

use clap::Parser;

mod commands;
mod daemon_client;

use commands::Cli;

fn main() {
    pathfinder_core::logging::init();

    let cli = Cli::parse();

    if let Err(e) = cli.execute() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
