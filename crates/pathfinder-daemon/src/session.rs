//! Per-connection protocol state machine.
//!
//! A session owns nothing from the catalogue; it only frames bytes and
//! translates between wire [`Command`]/[`Response`] and [`DomainCommand`]s
//! sent to the shared actor. Each transaction that mutates the catalogue
//! gets a `oneshot` reply; asynchronous [`Notification`]s for this session's
//! own subscriptions arrive over an `mpsc::UnboundedReceiver` registered at
//! `hello` time and are interleaved with frame reads via `tokio::select!`.
//!
//! State progresses CONNECTING → GREETED → CLOSING. There is no ACCEPTED
//! state distinct from GREETED: once `hello` succeeds the session is live
//! for the rest of its lifetime, so "greeted" and "accepted" collapse into
//! one state here.

use pathfinder_core::{Command, DomainError, FailReason, Notification, Props, Response, ResponseBody};
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::domain_actor::{DomainCommand, DomainHandle};
use crate::framing::{FrameReader, FrameWriter};
use crate::time::TimeAnchor;

pub struct SessionConfig {
    pub idle_timeout: Duration,
    pub time_anchor: TimeAnchor,
}

/// Drives one TCP connection until the client disconnects, sends a malformed
/// frame, or goes idle past `idle_timeout` without a `ping`.
pub async fn run_session(
    stream: TcpStream,
    remote_addr: String,
    domain: DomainHandle,
    config: SessionConfig,
) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(write_half);

    let mut client_id: Option<u64> = None;
    // subscription_id -> ta_id, so an async Notification can be reported
    // against the transaction that created the subscription.
    let mut subscription_tas: HashMap<u64, u64> = HashMap::new();
    let (notify_tx, mut notify_rx) = mpsc::unbounded_channel::<Notification>();

    loop {
        tokio::select! {
            biased;

            notification = notify_rx.recv() => {
                let Some(notification) = notification else {
                    // Actor dropped our sender: it is shutting down.
                    break;
                };
                let ta_id = subscription_tas
                    .get(&notification.subscription_id)
                    .copied()
                    .unwrap_or(0);
                let response = notification_to_response(ta_id, &notification, &config.time_anchor);
                if writer.write_response(&response).await.is_err() {
                    break;
                }
            }

            frame = tokio::time::timeout(config.idle_timeout, reader.read_request()) => {
                let Ok(frame) = frame else {
                    info!(remote_addr = %remote_addr, "session idle timeout");
                    break;
                };
                let request = match frame {
                    Ok(Some(request)) => request,
                    Ok(None) => {
                        debug!(remote_addr = %remote_addr, "client closed connection");
                        break;
                    }
                    Err(e) => {
                        warn!(remote_addr = %remote_addr, error = %e, "malformed frame, closing session");
                        break;
                    }
                };

                let ta_id = request.ta_id;

                if client_id.is_none() && !matches!(request.command, Command::Hello { .. }) {
                    let response = fail_response(ta_id, FailReason::NoHello);
                    if writer.write_response(&response).await.is_err() {
                        break;
                    }
                    continue;
                }

                let response = match request.command {
                    Command::Hello { min_version, max_version } => {
                        if client_id.is_some() {
                            fail_response(ta_id, FailReason::ClientIdExists)
                        } else {
                            match hello(&domain, &remote_addr, min_version, max_version, notify_tx.clone()).await {
                                Ok(outcome) => {
                                    client_id = Some(outcome.client_id);
                                    Response {
                                        ta_id,
                                        body: ResponseBody::Accept {
                                            client_id: Some(outcome.client_id),
                                            protocol_version: Some(outcome.negotiated_version),
                                        },
                                    }
                                }
                                Err(e) => fail_response(ta_id, e.fail_reason()),
                            }
                        }
                    }

                    Command::Publish { service_id, generation, props, ttl } => {
                        transaction_response(ta_id, publish(&domain, client_id.unwrap(), service_id, generation, props, ttl).await)
                    }

                    Command::Unpublish { service_id } => {
                        transaction_response(ta_id, unpublish(&domain, client_id.unwrap(), service_id).await)
                    }

                    Command::Subscribe { subscription_id, filter } => {
                        // Pre-register before dispatch: once accepted, this
                        // subscription keeps receiving async notifications
                        // against this same ta_id for its whole lifetime.
                        subscription_tas.insert(subscription_id, ta_id);
                        match subscribe(&domain, client_id.unwrap(), subscription_id, filter).await {
                            Ok(initial) => {
                                // Every service already matching the filter
                                // must be reported before the transaction is
                                // accepted, not after.
                                for n in &initial {
                                    let notify = notification_to_response(ta_id, n, &config.time_anchor);
                                    if writer.write_response(&notify).await.is_err() {
                                        return;
                                    }
                                }
                                // A live subscription's ta_id goes on
                                // receiving notify frames indefinitely, so it
                                // is accepted, never completed.
                                Response { ta_id, body: ResponseBody::Accept { client_id: None, protocol_version: None } }
                            }
                            Err(e) => {
                                subscription_tas.remove(&subscription_id);
                                fail_response(ta_id, e.fail_reason())
                            }
                        }
                    }

                    Command::Unsubscribe { subscription_id } => {
                        let result = unsubscribe(&domain, client_id.unwrap(), subscription_id).await;
                        if result.is_ok() {
                            subscription_tas.remove(&subscription_id);
                        }
                        transaction_response(ta_id, result)
                    }

                    Command::Services { filter } => {
                        match services(&domain, filter).await {
                            Ok(rows) => {
                                for row in &rows {
                                    let payload = pathfinder_core::NotifyPayload::Service {
                                        service_id: row.service_id,
                                        generation: row.generation,
                                        service_props: row.props.clone(),
                                        ttl: row.ttl,
                                        client_id: row.owner,
                                        orphan_since_unix: row.orphan_since.map(|i| config.time_anchor.to_unix(i)),
                                    };
                                    let notify = Response { ta_id, body: ResponseBody::Notify(payload) };
                                    if writer.write_response(&notify).await.is_err() {
                                        return;
                                    }
                                }
                                Response { ta_id, body: ResponseBody::Complete }
                            }
                            Err(e) => fail_response(ta_id, e.fail_reason()),
                        }
                    }

                    Command::Subscriptions => {
                        let rows = subscriptions(&domain).await;
                        for row in &rows {
                            let payload = pathfinder_core::NotifyPayload::Subscription {
                                subscription_id: row.subscription_id,
                                client_id: row.owner,
                                filter: row.filter_text.clone(),
                            };
                            let notify = Response { ta_id, body: ResponseBody::Notify(payload) };
                            if writer.write_response(&notify).await.is_err() {
                                return;
                            }
                        }
                        Response { ta_id, body: ResponseBody::Complete }
                    }

                    Command::Clients => {
                        let rows = clients(&domain).await;
                        for row in &rows {
                            let payload = pathfinder_core::NotifyPayload::Client {
                                client_id: row.client_id,
                                remote_addr: row.remote_addr.clone(),
                                connect_time_unix: crate::time::system_time_to_unix(row.connect_time),
                            };
                            let notify = Response { ta_id, body: ResponseBody::Notify(payload) };
                            if writer.write_response(&notify).await.is_err() {
                                return;
                            }
                        }
                        Response { ta_id, body: ResponseBody::Complete }
                    }

                    Command::Ping => Response { ta_id, body: ResponseBody::Complete },
                };

                if writer.write_response(&response).await.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(client_id) = client_id {
        let _ = domain.send(DomainCommand::SessionClosed { client_id }).await;
    }
}

fn fail_response(ta_id: u64, fail_reason: FailReason) -> Response {
    Response {
        ta_id,
        body: ResponseBody::Fail { fail_reason },
    }
}

fn transaction_response(ta_id: u64, result: Result<(), DomainError>) -> Response {
    match result {
        Ok(()) => Response { ta_id, body: ResponseBody::Complete },
        Err(e) => fail_response(ta_id, e.fail_reason()),
    }
}

fn notification_to_response(ta_id: u64, n: &Notification, anchor: &TimeAnchor) -> Response {
    let payload = pathfinder_core::NotifyPayload::ServiceChange {
        match_type: n.match_type,
        service_id: n.service_id,
        generation: n.generation,
        service_props: n.props.clone(),
        ttl: n.ttl,
        client_id: n.owner,
        orphan_since_unix: n.orphan_since.map(|i| anchor.to_unix(i)),
    };
    Response {
        ta_id,
        body: ResponseBody::Notify(payload),
    }
}

// ---- domain actor round-trips -----------------------------------------

async fn hello(
    domain: &DomainHandle,
    remote_addr: &str,
    min_version: u32,
    max_version: u32,
    outbound: mpsc::UnboundedSender<Notification>,
) -> Result<pathfinder_core::HelloOutcome, DomainError> {
    let (reply, rx) = oneshot::channel();
    let _ = domain
        .send(DomainCommand::Hello {
            // Real deployments would derive `user` from transport-layer
            // authentication; this server trusts the connecting peer's
            // address as the identity until that's wired in.
            user: remote_addr.to_string(),
            remote_addr: remote_addr.to_string(),
            min_version,
            max_version,
            connect_time: std::time::SystemTime::now(),
            outbound,
            reply,
        })
        .await;
    rx.await.unwrap_or(Err(DomainError::NoHello))
}

async fn publish(
    domain: &DomainHandle,
    caller: u64,
    service_id: u64,
    generation: u32,
    props: Props,
    ttl: u64,
) -> Result<(), DomainError> {
    let (reply, rx) = oneshot::channel();
    let _ = domain
        .send(DomainCommand::Publish { caller, service_id, generation, props, ttl, reply })
        .await;
    rx.await.unwrap_or(Err(DomainError::NonExistentService { service_id }))
}

async fn unpublish(domain: &DomainHandle, caller: u64, service_id: u64) -> Result<(), DomainError> {
    let (reply, rx) = oneshot::channel();
    let _ = domain
        .send(DomainCommand::Unpublish { caller, service_id, reply })
        .await;
    rx.await.unwrap_or(Err(DomainError::NonExistentService { service_id }))
}

async fn subscribe(
    domain: &DomainHandle,
    caller: u64,
    subscription_id: u64,
    filter_text: String,
) -> Result<Vec<Notification>, DomainError> {
    let (reply, rx) = oneshot::channel();
    let _ = domain
        .send(DomainCommand::Subscribe { caller, subscription_id, filter_text, reply })
        .await;
    rx.await
        .unwrap_or(Err(DomainError::NonExistentSubscription { subscription_id }))
}

async fn unsubscribe(domain: &DomainHandle, caller: u64, subscription_id: u64) -> Result<(), DomainError> {
    let (reply, rx) = oneshot::channel();
    let _ = domain
        .send(DomainCommand::Unsubscribe { caller, subscription_id, reply })
        .await;
    rx.await
        .unwrap_or(Err(DomainError::NonExistentSubscription { subscription_id }))
}

async fn services(
    domain: &DomainHandle,
    filter_text: Option<String>,
) -> Result<Vec<pathfinder_core::ServiceSnapshot>, DomainError> {
    let (reply, rx) = oneshot::channel();
    let _ = domain.send(DomainCommand::Services { filter_text, reply }).await;
    rx.await.unwrap_or_else(|_| Ok(Vec::new()))
}

async fn subscriptions(domain: &DomainHandle) -> Vec<pathfinder_core::SubscriptionSnapshot> {
    let (reply, rx) = oneshot::channel();
    let _ = domain.send(DomainCommand::Subscriptions { reply }).await;
    rx.await.unwrap_or_default()
}

async fn clients(domain: &DomainHandle) -> Vec<pathfinder_core::SessionInfo> {
    let (reply, rx) = oneshot::channel();
    let _ = domain.send(DomainCommand::Clients { reply }).await;
    rx.await.unwrap_or_default()
}
