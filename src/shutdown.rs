use std::future::Future;
use tokio::sync::watch;
use tracing::{error, info};

/// Spawns a task that flips the returned channel to `true` once `signal`
/// fires. If the signal cannot be installed the channel is kept open and
/// never flips, so the tracker keeps running without a shutdown hook.
pub fn spawn_shutdown_listener<S>(signal: S) -> watch::Receiver<bool>
where
    S: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down gracefully...");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C, graceful shutdown disabled");
                // Holding the sender forever; a closed channel reads as shutdown
                std::future::pending::<()>().await;
            }
        }
    });
    shutdown_rx
}
