//! Ping command implementation.

use anyhow::{bail, Result};
use clap::Args;
use pathfinder_core::{Command, ResponseBody};

use crate::daemon_client::{describe_fail, DaemonConnection};

/// Check that the daemon is reachable and responding
#[derive(Args, Debug)]
pub struct PingArgs {}

pub fn execute(addr: &str, _args: PingArgs) -> Result<()> {
    let mut conn = DaemonConnection::connect(addr)?;
    let response = conn.transact(Command::Ping)?;
    match response.body {
        ResponseBody::Complete => {
            println!("{addr}: ok (client {})", conn.client_id);
            Ok(())
        }
        ResponseBody::Fail { fail_reason } => {
            bail!("ping failed: {} ({fail_reason:?})", describe_fail(fail_reason));
        }
        other => bail!("unexpected response: {other:?}"),
    }
}
