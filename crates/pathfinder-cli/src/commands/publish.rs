//! Publish command implementation.

use anyhow::{bail, Result};
use clap::Args;
use pathfinder_core::{Command, Props, ResponseBody};

use crate::daemon_client::{describe_fail, DaemonConnection};

/// Publish (or republish) a service under this connection's ownership
#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Numeric service id (stable across republishes of the same service)
    service_id: u64,

    /// Generation number; must increase on every real change to `prop`
    #[arg(long, default_value_t = 1)]
    generation: u32,

    /// Property as `key=value`, repeatable; values are parsed as integers
    /// when possible, otherwise kept as strings
    #[arg(long = "prop", value_name = "KEY=VALUE")]
    props: Vec<String>,

    /// Seconds the daemon should keep this service alive after the
    /// connection is lost before expiring it
    #[arg(long, default_value_t = 60)]
    ttl: u64,

    /// Keep the connection open after publishing, so the service stays
    /// owned (not orphaned) until interrupted
    #[arg(long)]
    hold: bool,
}

pub fn execute(addr: &str, args: PublishArgs) -> Result<()> {
    let props = parse_props(&args.props)?;

    let mut conn = DaemonConnection::connect(addr)?;
    let response = conn.transact(Command::Publish {
        service_id: args.service_id,
        generation: args.generation,
        props,
        ttl: args.ttl,
    })?;

    match response.body {
        ResponseBody::Complete => {
            println!("published service {} (generation {})", args.service_id, args.generation);
        }
        ResponseBody::Fail { fail_reason } => {
            bail!("publish failed: {} ({fail_reason:?})", describe_fail(fail_reason));
        }
        other => bail!("unexpected response: {other:?}"),
    }

    if args.hold {
        println!("holding connection open; interrupt (ctrl-c) to let the service orphan");
        // Blocks until the daemon closes the connection (idle timeout) or we
        // are killed, at which point the service enters its orphan grace
        // period instead of being withdrawn immediately.
        loop {
            if conn.recv().is_err() {
                break;
            }
        }
    }

    Ok(())
}

fn parse_props(pairs: &[String]) -> Result<Props> {
    let mut props = Props::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("invalid --prop '{pair}': expected key=value");
        };
        match value.parse::<i64>() {
            Ok(n) => props.insert(key, n),
            Err(_) => props.insert(key, value),
        }
    }
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_int_and_string_values() {
        let props = parse_props(&["port=8080".to_string(), "name=widget".to_string()]).unwrap();
        assert_eq!(props.get("port").next().unwrap().as_int(), Some(8080));
        assert_eq!(props.get("name").next().unwrap().as_str(), Some("widget"));
    }

    #[test]
    fn rejects_missing_equals() {
        assert!(parse_props(&["nokeyvalue".to_string()]).is_err());
    }
}
