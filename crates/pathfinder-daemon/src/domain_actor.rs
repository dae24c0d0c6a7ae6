//! The single task that owns a [`Domain`] and serializes every command
//! against it.
//!
//! Sessions never touch the `Domain` directly; they send a [`DomainCommand`]
//! over `mpsc` and await a `oneshot` reply. This is what turns spec.md §5's
//! "single-threaded cooperative" requirement into something true on a real
//! multi-task Tokio runtime: only this actor ever calls a mutating `Domain`
//! method, so no command can observe another command's half-applied state.
//!
//! Asynchronous delivery (a publish notifying some other session's
//! subscription) is handled the same way regardless of which command
//! produced it: every [`Notification`] the domain returns is routed here, by
//! `subscription_id`, to the owning session's outbound channel.

use pathfinder_core::{
    ClientId, Domain, DomainError, HelloOutcome, Notification, Props, ServiceId, ServiceSnapshot,
    SessionInfo, SubscriptionId, SubscriptionSnapshot,
};
use std::collections::HashMap;
use std::time::{Instant, SystemTime};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

/// One command routed to the domain actor. Every variant that mutates the
/// catalogue carries a `oneshot` reply for the caller's own transaction
/// result; any notifications for *other* subscribers are delivered
/// separately over their outbound channels, never through this reply.
pub enum DomainCommand {
    Hello {
        user: String,
        remote_addr: String,
        min_version: u32,
        max_version: u32,
        connect_time: SystemTime,
        outbound: mpsc::UnboundedSender<Notification>,
        reply: oneshot::Sender<Result<HelloOutcome, DomainError>>,
    },
    Publish {
        caller: ClientId,
        service_id: ServiceId,
        generation: u32,
        props: Props,
        ttl: u64,
        reply: oneshot::Sender<Result<(), DomainError>>,
    },
    Unpublish {
        caller: ClientId,
        service_id: ServiceId,
        reply: oneshot::Sender<Result<(), DomainError>>,
    },
    /// Unlike other mutating commands, the initial `appeared` notifications
    /// for a subscribe are returned directly to the caller rather than
    /// dispatched through an outbox: they must reach the wire before the
    /// transaction's own `accept`, and this session's outbox isn't even
    /// guaranteed to be drained before that reply is written.
    Subscribe {
        caller: ClientId,
        subscription_id: SubscriptionId,
        filter_text: String,
        reply: oneshot::Sender<Result<Vec<Notification>, DomainError>>,
    },
    Unsubscribe {
        caller: ClientId,
        subscription_id: SubscriptionId,
        reply: oneshot::Sender<Result<(), DomainError>>,
    },
    Services {
        filter_text: Option<String>,
        reply: oneshot::Sender<Result<Vec<ServiceSnapshot>, DomainError>>,
    },
    Subscriptions {
        reply: oneshot::Sender<Vec<SubscriptionSnapshot>>,
    },
    Clients {
        reply: oneshot::Sender<Vec<SessionInfo>>,
    },
    /// Sent by a session's teardown path once its transport is gone, for any
    /// reason. No reply: the session is already exiting.
    SessionClosed { client_id: ClientId },
}

pub type DomainHandle = mpsc::Sender<DomainCommand>;

/// Spawns the domain actor task and returns a handle to send it commands.
/// The task runs until every `DomainHandle` clone is dropped.
pub fn spawn_domain_actor(domain: Domain) -> DomainHandle {
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(run(domain, rx));
    tx
}

async fn run(mut domain: Domain, mut rx: mpsc::Receiver<DomainCommand>) {
    let mut outboxes: HashMap<ClientId, mpsc::UnboundedSender<Notification>> = HashMap::new();

    loop {
        let sleep = match domain.next_orphan_deadline() {
            Some(deadline) => tokio::time::sleep_until(deadline.into()),
            None => tokio::time::sleep(std::time::Duration::from_secs(3600)),
        };
        tokio::pin!(sleep);

        tokio::select! {
            biased;

            maybe_cmd = rx.recv() => {
                match maybe_cmd {
                    Some(cmd) => handle(&mut domain, &mut outboxes, cmd),
                    None => {
                        debug!("domain actor shutting down: all handles dropped");
                        break;
                    }
                }
            }

            _ = &mut sleep => {
                let expired = domain.expire_orphans(Instant::now());
                if !expired.is_empty() {
                    trace!(count = expired.len(), "orphan timers expired");
                }
                dispatch(&domain, &outboxes, expired);
            }
        }
    }
}

fn handle(
    domain: &mut Domain,
    outboxes: &mut HashMap<ClientId, mpsc::UnboundedSender<Notification>>,
    cmd: DomainCommand,
) {
    match cmd {
        DomainCommand::Hello {
            user,
            remote_addr,
            min_version,
            max_version,
            connect_time,
            outbound,
            reply,
        } => {
            let result = domain.hello(user, remote_addr, min_version, max_version, connect_time);
            if let Ok(outcome) = &result {
                outboxes.insert(outcome.client_id, outbound);
            }
            let _ = reply.send(result);
        }

        DomainCommand::Publish {
            caller,
            service_id,
            generation,
            props,
            ttl,
            reply,
        } => {
            let result = domain.publish(caller, service_id, generation, props, ttl, Instant::now());
            respond_and_dispatch(domain, outboxes, result, reply);
        }

        DomainCommand::Unpublish {
            caller,
            service_id,
            reply,
        } => {
            let result = domain.unpublish(caller, service_id);
            respond_and_dispatch(domain, outboxes, result, reply);
        }

        DomainCommand::Subscribe {
            caller,
            subscription_id,
            filter_text,
            reply,
        } => {
            let result = domain.subscribe(caller, subscription_id, filter_text);
            let _ = reply.send(result);
        }

        DomainCommand::Unsubscribe {
            caller,
            subscription_id,
            reply,
        } => {
            let _ = reply.send(domain.unsubscribe(caller, subscription_id));
        }

        DomainCommand::Services { filter_text, reply } => {
            let _ = reply.send(domain.services(filter_text.as_deref()));
        }

        DomainCommand::Subscriptions { reply } => {
            let _ = reply.send(domain.subscriptions());
        }

        DomainCommand::Clients { reply } => {
            let _ = reply.send(domain.clients());
        }

        DomainCommand::SessionClosed { client_id } => {
            outboxes.remove(&client_id);
            domain.on_session_close(client_id, Instant::now());
        }
    }
}

/// Replies to the issuing transaction and, on success, routes every
/// resulting notification to its subscription's owner.
fn respond_and_dispatch(
    domain: &Domain,
    outboxes: &HashMap<ClientId, mpsc::UnboundedSender<Notification>>,
    result: Result<Vec<Notification>, DomainError>,
    reply: oneshot::Sender<Result<(), DomainError>>,
) {
    match result {
        Ok(notifications) => {
            dispatch(domain, outboxes, notifications);
            let _ = reply.send(Ok(()));
        }
        Err(e) => {
            let _ = reply.send(Err(e));
        }
    }
}

fn dispatch(
    domain: &Domain,
    outboxes: &HashMap<ClientId, mpsc::UnboundedSender<Notification>>,
    notifications: Vec<Notification>,
) {
    for n in notifications {
        let Some(owner) = domain.subscription_owner(n.subscription_id) else {
            continue;
        };
        if let Some(tx) = outboxes.get(&owner) {
            if tx.send(n).is_err() {
                warn!(client_id = owner, "notification dropped: session outbox closed");
            }
        }
    }
}
