// Signal handling module
//
// Supported signals:
// - SIGINT:  Stop the server (Ctrl+C)
// - SIGTERM: Stop the server

use crate::logger;

/// Resolve once the process is asked to stop (Unix)
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            logger::log_error(&format!("Failed to register SIGINT handler: {e}"));
            return std::future::pending().await;
        }
    };
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            logger::log_error(&format!("Failed to register SIGTERM handler: {e}"));
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigint.recv() => logger::log_info("\n[SIGNAL] SIGINT received (Ctrl+C)"),
        _ = sigterm.recv() => logger::log_info("\n[SIGNAL] SIGTERM received"),
    }
}

/// Windows fallback - only handles Ctrl+C
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => logger::log_info("\n[SIGNAL] Ctrl+C received"),
        Err(e) => {
            logger::log_error(&format!("Failed to listen for Ctrl+C: {e}"));
            std::future::pending::<()>().await;
        }
    }
}
