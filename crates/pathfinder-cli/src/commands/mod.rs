//! CLI command dispatch and execution.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod clients;
mod ping;
mod publish;
mod services;
mod subscribe;
mod subscriptions;
mod unpublish;

/// pathfinder - query and drive a Pathfinder service-discovery daemon
#[derive(Parser, Debug)]
#[command(name = "pathfinder", version, about = "CLI for the Pathfinder service-discovery daemon")]
pub struct Cli {
    /// Daemon address to connect to
    #[arg(long, global = true, default_value = "127.0.0.1:4242")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Publish (or republish) a service
    Publish(publish::PublishArgs),

    /// Withdraw a service this connection published
    Unpublish(unpublish::UnpublishArgs),

    /// List currently published services
    Services(services::ServicesArgs),

    /// List active subscriptions on the daemon
    Subscriptions(subscriptions::SubscriptionsArgs),

    /// List connected clients
    Clients(clients::ClientsArgs),

    /// Subscribe to a filter and print service changes until interrupted
    Subscribe(subscribe::SubscribeArgs),

    /// Check that the daemon is reachable and responding
    Ping(ping::PingArgs),
}

impl Cli {
    /// Execute the CLI command.
    pub fn execute(self) -> Result<()> {
        match self.command {
            Commands::Publish(args) => publish::execute(&self.addr, args),
            Commands::Unpublish(args) => unpublish::execute(&self.addr, args),
            Commands::Services(args) => services::execute(&self.addr, args),
            Commands::Subscriptions(args) => subscriptions::execute(&self.addr, args),
            Commands::Clients(args) => clients::execute(&self.addr, args),
            Commands::Subscribe(args) => subscribe::execute(&self.addr, args),
            Commands::Ping(args) => ping::execute(&self.addr, args),
        }
    }
}
