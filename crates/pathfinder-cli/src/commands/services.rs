//! Services listing command.

use anyhow::Result;
use clap::Args;
use pathfinder_core::{Command, NotifyPayload, ResponseBody};

use crate::daemon_client::{format_props, DaemonConnection};

/// List currently published services, optionally narrowed by a filter
#[derive(Args, Debug)]
pub struct ServicesArgs {
    /// LDAP-style filter, e.g. "(type=http)"
    filter: Option<String>,
}

pub fn execute(addr: &str, args: ServicesArgs) -> Result<()> {
    let mut conn = DaemonConnection::connect(addr)?;
    let rows = conn.collect(Command::Services { filter: args.filter })?;

    if rows.is_empty() {
        println!("no services");
        return Ok(());
    }

    for row in rows {
        if let ResponseBody::Notify(NotifyPayload::Service {
            service_id,
            generation,
            service_props,
            ttl,
            client_id,
            orphan_since_unix,
        }) = row.body
        {
            let orphan = match orphan_since_unix {
                Some(since) => format!(" orphaned-since={since}"),
                None => String::new(),
            };
            println!(
                "service {service_id} gen={generation} client={client_id} ttl={ttl}{orphan} {}",
                format_props(&service_props)
            );
        }
    }
    Ok(())
}
