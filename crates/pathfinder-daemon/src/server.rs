//! TCP accept loop: binds the configured address, spawns the domain actor,
//! and hands each accepted connection its own [`session`] task.

use anyhow::{Context, Result};
use pathfinder_core::{Config, Domain};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::domain_actor::spawn_domain_actor;
use crate::session::{run_session, SessionConfig};
use crate::time::TimeAnchor;

pub async fn run_server(config: Config, cancel: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "pathfinder daemon listening");
    serve(listener, config, cancel).await
}

/// The accept loop proper, over an already-bound listener. Split out from
/// [`run_server`] so tests can bind an ephemeral port and read back the
/// actual address before handing the listener over.
pub async fn serve(listener: TcpListener, config: Config, cancel: CancellationToken) -> Result<()> {
    let domain = Domain::new(config.domain.resource_limits(), config.domain.max_filter_nodes);
    let handle = spawn_domain_actor(domain);
    let idle_timeout = Duration::from_secs(config.server.idle_timeout_secs);
    let time_anchor = TimeAnchor::now();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("accept loop cancelled");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let remote_addr = addr.to_string();
                        let handle = handle.clone();
                        let session_config = SessionConfig { idle_timeout, time_anchor };
                        debug!(remote_addr = %remote_addr, "accepted connection");
                        tokio::spawn(async move {
                            run_session(stream, remote_addr, handle, session_config).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }

    Ok(())
}
