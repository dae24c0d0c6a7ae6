//! Graceful shutdown coordination for the accept loop.

use anyhow::Result;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Cancels the accept loop and waits for it to exit, up to `shutdown_timeout`.
/// A timed-out accept loop is logged and the process exits anyway; in-flight
/// sessions still complete on their own tasks since those hold no reference
/// to the cancellation token.
pub async fn graceful_shutdown(
    cancel: tokio_util::sync::CancellationToken,
    server_task: JoinHandle<Result<()>>,
    shutdown_timeout: Duration,
) -> Result<()> {
    info!("beginning graceful shutdown (timeout: {:?})", shutdown_timeout);
    cancel.cancel();

    match timeout(shutdown_timeout, server_task).await {
        Ok(Ok(Ok(()))) => {
            info!("accept loop stopped cleanly");
            Ok(())
        }
        Ok(Ok(Err(e))) => {
            error!("accept loop returned an error: {e}");
            Err(e)
        }
        Ok(Err(join_err)) => {
            error!("accept loop task panicked: {join_err}");
            anyhow::bail!("accept loop task panicked: {join_err}");
        }
        Err(_) => {
            warn!("accept loop did not stop within {:?}", shutdown_timeout);
            Ok(())
        }
    }
}
