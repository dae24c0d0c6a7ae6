//! Clients listing command.

use anyhow::Result;
use clap::Args;
use pathfinder_core::{Command, NotifyPayload, ResponseBody};

use crate::daemon_client::DaemonConnection;

/// List connected clients
#[derive(Args, Debug)]
pub struct ClientsArgs {}

pub fn execute(addr: &str, _args: ClientsArgs) -> Result<()> {
    let mut conn = DaemonConnection::connect(addr)?;
    let rows = conn.collect(Command::Clients)?;

    if rows.is_empty() {
        println!("no clients");
        return Ok(());
    }

    for row in rows {
        if let ResponseBody::Notify(NotifyPayload::Client { client_id, remote_addr, connect_time_unix }) = row.body {
            println!("client {client_id} addr={remote_addr} connected-since={connect_time_unix}");
        }
    }
    Ok(())
}
