//! A thin, synchronous client for the Pathfinder daemon's newline-JSON
//! protocol.
//!
//! Each CLI invocation opens one TCP connection, sends `hello`, runs its own
//! transaction, then either exits (one-shot commands) or keeps the
//! connection open to stream `notify` frames (the `watch` command).

use anyhow::{bail, Context, Result};
use pathfinder_core::{Command, FailReason, Props, Request, Response, ResponseBody};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

pub struct DaemonConnection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    next_ta_id: u64,
    pub client_id: u64,
}

impl DaemonConnection {
    /// Connects to `addr` and completes the `hello` handshake, returning the
    /// assigned client id.
    pub fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).with_context(|| format!("connecting to {addr}"))?;
        let writer = stream.try_clone().context("cloning daemon connection")?;
        let mut conn = Self { reader: BufReader::new(stream), writer, next_ta_id: 1, client_id: 0 };
        conn.client_id = conn.hello()?;
        Ok(conn)
    }

    fn hello(&mut self) -> Result<u64> {
        let response = self.transact(Command::Hello {
            min_version: pathfinder_core::SUPPORTED_MIN_VERSION,
            max_version: pathfinder_core::SUPPORTED_MAX_VERSION,
        })?;
        match response.body {
            ResponseBody::Accept { client_id, .. } => {
                client_id.ok_or_else(|| anyhow::anyhow!("daemon accepted hello without a client id"))
            }
            ResponseBody::Fail { fail_reason } => bail!("daemon rejected hello: {fail_reason:?}"),
            other => bail!("unexpected hello response: {other:?}"),
        }
    }

    /// Sends `command` as a new transaction and returns its single,
    /// non-notify response (`complete` or `fail`).
    pub fn transact(&mut self, command: Command) -> Result<Response> {
        let ta_id = self.send(command)?;
        loop {
            let response = self.recv()?;
            if response.ta_id != ta_id {
                continue;
            }
            if matches!(response.body, ResponseBody::Notify(_)) {
                continue;
            }
            return Ok(response);
        }
    }

    /// Sends `command` and collects every `notify` row until the matching
    /// `complete`/`fail`, for listing commands (`services`, `subscriptions`,
    /// `clients`).
    pub fn collect(&mut self, command: Command) -> Result<Vec<Response>> {
        let ta_id = self.send(command)?;
        let mut rows = Vec::new();
        loop {
            let response = self.recv()?;
            if response.ta_id != ta_id {
                continue;
            }
            match response.body {
                ResponseBody::Notify(_) => rows.push(response),
                ResponseBody::Complete => return Ok(rows),
                ResponseBody::Fail { fail_reason } => bail!("request failed: {fail_reason:?}"),
                ResponseBody::Accept { .. } => bail!("unexpected accept mid-transaction"),
            }
        }
    }

    /// Sends a `subscribe` command and collects the initial `notify` rows for
    /// services that already matched the filter at subscribe time, which the
    /// daemon delivers before the transaction's `accept`. Returns those rows
    /// and the transaction id to keep reading notifications against.
    pub fn subscribe(&mut self, command: Command) -> Result<(u64, Vec<Response>)> {
        let ta_id = self.send(command)?;
        let mut rows = Vec::new();
        loop {
            let response = self.recv()?;
            if response.ta_id != ta_id {
                continue;
            }
            match response.body {
                ResponseBody::Notify(_) => rows.push(response),
                ResponseBody::Accept { .. } => return Ok((ta_id, rows)),
                ResponseBody::Fail { fail_reason } => bail!("subscribe failed: {fail_reason:?}"),
                ResponseBody::Complete => bail!("unexpected complete mid-transaction"),
            }
        }
    }

    /// Sends `command` and returns its transaction id without waiting for a
    /// reply — used by `watch` to issue `subscribe` and then read
    /// notifications indefinitely.
    pub fn send(&mut self, command: Command) -> Result<u64> {
        let ta_id = self.next_ta_id;
        self.next_ta_id += 1;
        let request = Request { ta_id, command };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        Ok(ta_id)
    }

    /// Blocks for the next response frame, of any kind.
    pub fn recv(&mut self) -> Result<Response> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        if n == 0 {
            bail!("daemon closed the connection");
        }
        serde_json::from_str(line.trim_end()).context("parsing daemon response")
    }
}

pub fn describe_fail(fail_reason: FailReason) -> &'static str {
    match fail_reason {
        FailReason::NoHello => "no hello received yet",
        FailReason::ClientIdExists => "client id already in use",
        FailReason::InvalidFilterSyntax => "invalid filter syntax",
        FailReason::SubscriptionIdExists => "subscription id already exists",
        FailReason::NonExistentSubscription => "subscription does not exist",
        FailReason::NonExistentService => "service does not exist",
        FailReason::UnsupportedProtocolVersion => "unsupported protocol version",
        FailReason::PermissionDenied => "permission denied",
        FailReason::OldGeneration => "generation is not newer than stored",
        FailReason::SameGenerationButDifferent => "same generation republished with different props",
        FailReason::InsufficientResources => "insufficient resources",
    }
}

/// Renders a `Props` multimap as `key=v1,v2 key2=v3` for terse table output.
pub fn format_props(props: &Props) -> String {
    props
        .iter()
        .map(|(key, values)| {
            let joined = values
                .iter()
                .map(|v| match v.as_int() {
                    Some(n) => n.to_string(),
                    None => v.as_str().unwrap_or_default().to_string(),
                })
                .collect::<Vec<_>>()
                .join(",");
            format!("{key}={joined}")
        })
        .collect::<Vec<_>>()
        .join(" ")
}
