//! Subscribe command: register a filter and print service changes to stdout
//! until interrupted or the connection drops.

use anyhow::Result;
use clap::Args;
use pathfinder_core::{Command, MatchType, NotifyPayload, ResponseBody};

use crate::daemon_client::{format_props, DaemonConnection};

/// Subscribe to a filter and print service changes until interrupted
#[derive(Args, Debug)]
pub struct SubscribeArgs {
    /// LDAP-style filter, e.g. "(type=http)"
    filter: String,

    /// Subscription id to register with the daemon
    #[arg(long, default_value_t = 1)]
    subscription_id: u64,
}

pub fn execute(addr: &str, args: SubscribeArgs) -> Result<()> {
    let mut conn = DaemonConnection::connect(addr)?;
    let (_ta_id, initial) = conn.subscribe(Command::Subscribe {
        subscription_id: args.subscription_id,
        filter: args.filter.clone(),
    })?;

    println!("watching \"{}\"; interrupt (ctrl-c) to stop", args.filter);
    for notification in &initial {
        if let ResponseBody::Notify(NotifyPayload::ServiceChange {
            match_type,
            service_id,
            generation,
            service_props,
            ttl,
            client_id,
            orphan_since_unix,
        }) = &notification.body
        {
            print_change(*match_type, *service_id, *generation, service_props.as_ref(), *ttl, *client_id, *orphan_since_unix);
        }
    }
    loop {
        let notification = match conn.recv() {
            Ok(n) => n,
            Err(_) => {
                println!("connection closed");
                return Ok(());
            }
        };
        if let ResponseBody::Notify(NotifyPayload::ServiceChange {
            match_type,
            service_id,
            generation,
            service_props,
            ttl,
            client_id,
            orphan_since_unix,
        }) = notification.body
        {
            print_change(match_type, service_id, generation, service_props.as_ref(), ttl, client_id, orphan_since_unix);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn print_change(
    match_type: MatchType,
    service_id: u64,
    generation: Option<u32>,
    service_props: Option<&pathfinder_core::Props>,
    ttl: Option<u64>,
    client_id: Option<u64>,
    orphan_since_unix: Option<u64>,
) {
    let verb = match match_type {
        MatchType::Appeared => "appeared",
        MatchType::Modified => "modified",
        MatchType::Disappeared => "disappeared",
    };
    let mut line = format!("{verb} service={service_id}");
    if let Some(generation) = generation {
        line.push_str(&format!(" gen={generation}"));
    }
    if let Some(client_id) = client_id {
        line.push_str(&format!(" client={client_id}"));
    }
    if let Some(ttl) = ttl {
        line.push_str(&format!(" ttl={ttl}"));
    }
    if let Some(since) = orphan_since_unix {
        line.push_str(&format!(" orphaned-since={since}"));
    }
    if let Some(props) = service_props {
        line.push(' ');
        line.push_str(&format_props(props));
    }
    println!("{line}");
}
