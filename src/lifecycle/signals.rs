//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP forces a snapshot rebuild, not shutdown
//! - A handler that cannot be installed is logged and never fires

/// What a received signal asks the router to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    Shutdown,
    Reload,
}

/// Wait for the next signal of interest.
pub async fn next_signal() -> SignalEvent {
    tokio::select! {
        _ = ctrl_c() => SignalEvent::Shutdown,
        _ = terminate() => SignalEvent::Shutdown,
        _ = hangup() => SignalEvent::Reload,
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn unix_signal(kind: tokio::signal::unix::SignalKind, name: &'static str) {
    match tokio::signal::unix::signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            tracing::error!(signal = name, error = %e, "Failed to install signal handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    unix_signal(tokio::signal::unix::SignalKind::terminate(), "SIGTERM").await;
}

#[cfg(unix)]
async fn hangup() {
    unix_signal(tokio::signal::unix::SignalKind::hangup(), "SIGHUP").await;
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

#[cfg(not(unix))]
async fn hangup() {
    std::future::pending::<()>().await;
}
