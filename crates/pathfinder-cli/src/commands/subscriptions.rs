//! Subscriptions listing command.

use anyhow::Result;
use clap::Args;
use pathfinder_core::{Command, NotifyPayload, ResponseBody};

use crate::daemon_client::DaemonConnection;

/// List active subscriptions on the daemon
#[derive(Args, Debug)]
pub struct SubscriptionsArgs {}

pub fn execute(addr: &str, _args: SubscriptionsArgs) -> Result<()> {
    let mut conn = DaemonConnection::connect(addr)?;
    let rows = conn.collect(Command::Subscriptions)?;

    if rows.is_empty() {
        println!("no subscriptions");
        return Ok(());
    }

    for row in rows {
        if let ResponseBody::Notify(NotifyPayload::Subscription { subscription_id, client_id, filter }) = row.body {
            println!("subscription {subscription_id} client={client_id} filter={filter}");
        }
    }
    Ok(())
}
