use tokio::signal;

/// Resolves on Ctrl+C or, on unix, SIGTERM. A handler that fails to install
/// never resolves, so the other signal still works.
pub(crate) async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = interrupt => tracing::info!(signal = "SIGINT", "shutdown signal received"),
        _ = terminate() => tracing::info!(signal = "SIGTERM", "shutdown signal received"),
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
