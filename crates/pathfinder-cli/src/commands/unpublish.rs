//! Unpublish command implementation.

use anyhow::{bail, Result};
use clap::Args;
use pathfinder_core::{Command, ResponseBody};

use crate::daemon_client::{describe_fail, DaemonConnection};

/// Withdraw a service owned by this connection
///
/// Since ownership is tied to the connection that published a service, this
/// only succeeds when issued over the same connection the service was
/// published on — in practice that means `publish --hold` in one terminal
/// and a scripted follow-up over the same client id, not two independent CLI
/// invocations. A disconnected publisher's service orphans and expires on
/// its own; this command is for explicit, same-session withdrawal.
#[derive(Args, Debug)]
pub struct UnpublishArgs {
    /// Numeric service id to withdraw
    service_id: u64,
}

pub fn execute(addr: &str, args: UnpublishArgs) -> Result<()> {
    let mut conn = DaemonConnection::connect(addr)?;
    let response = conn.transact(Command::Unpublish { service_id: args.service_id })?;
    match response.body {
        ResponseBody::Complete => {
            println!("unpublished service {}", args.service_id);
            Ok(())
        }
        ResponseBody::Fail { fail_reason } => {
            bail!("unpublish failed: {} ({fail_reason:?})", describe_fail(fail_reason));
        }
        other => bail!("unexpected response: {other:?}"),
    }
}
