use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancels `cancel` on the first SIGINT or SIGTERM.
pub fn cancel_on_shutdown_signal(cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => Some(sigterm),
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                None
            }
        };
        let terminate = async {
            match sigterm.as_mut() {
                Some(sigterm) => sigterm.recv().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
            _ = terminate => info!("Received SIGTERM, shutting down"),
        }
        cancel.cancel();
    });
}
