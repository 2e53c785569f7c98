//! Process signals that cancel a lookup or stop the server.

use std::{future::Future, io};

use tracing::{info, warn};

/// Resolves once `signal` fires. A handler that can't be installed never
/// resolves, so callers keep running instead of cancelling right away.
async fn received<F>(name: &'static str, signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(err) = signal.await {
        warn!(signal = name, error = %err, "failed to listen for signal");
        std::future::pending::<()>().await;
    }
}

/// Ctrl+C.
pub async fn ctrl_c() {
    received("ctrl-c", tokio::signal::ctrl_c()).await;
}

/// Ctrl+C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = received("sigterm", async {
        use tokio::signal::unix::{SignalKind, signal};

        signal(SignalKind::terminate())?.recv().await;
        Ok::<_, io::Error>(())
    });

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c() => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
