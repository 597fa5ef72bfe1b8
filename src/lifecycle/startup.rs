//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize all subsystems in dependency order
//! - Start background tasks (snapshot watcher, health poller, signals)
//! - Bind the inspection listener and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)
//! - Background tasks get a bounded drain window on shutdown

use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::watcher::apply_updates;
use crate::config::{load_config, load_router, ConfigError, RouterConfig, SnapshotWatcher};
use crate::health::HealthPoller;
use crate::http::InspectionServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::{next_signal, SignalEvent};
use crate::observability::{logging, metrics};
use crate::state::RouterHandle;

/// How long background tasks get to finish after the listener stops.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("Invalid address '{0}'")]
    Address(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to watch snapshot documents: {0}")]
    Watch(#[from] notify::Error),

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

fn parse_addr(raw: &str) -> Result<SocketAddr, StartupError> {
    raw.parse().map_err(|_| StartupError::Address(raw.to_string()))
}

/// Load the config at `config_path` and run the router until a shutdown
/// signal arrives.
pub async fn run(config_path: &Path) -> Result<(), StartupError> {
    let config = load_config(config_path)?;
    logging::init(&config.observability.log_level);
    tracing::info!(path = %config_path.display(), "Configuration loaded");

    if config.observability.metrics_enabled {
        metrics::init_metrics(parse_addr(&config.observability.metrics_address)?)?;
    }

    let router = load_router(&config.snapshot, &config.routing)?;
    let handle = Arc::new(RouterHandle::new(router));
    tracing::info!(
        caches = handle.current().register().caches().count(),
        delivery_services = handle.current().register().delivery_services().count(),
        "Routing snapshot loaded"
    );

    serve(config, handle).await
}

/// Start background tasks and serve the inspection API over `handle`.
pub async fn serve(config: RouterConfig, handle: Arc<RouterHandle>) -> Result<(), StartupError> {
    let shutdown = Shutdown::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    // Dropping the watcher stops it, so it lives until serve returns.
    let _watcher = if config.snapshot.watch {
        let (watcher, updates) = SnapshotWatcher::new(config.snapshot.clone(), config.routing.clone());
        let watcher = watcher.run()?;
        tokio::spawn(apply_updates(Arc::clone(&handle), updates));
        Some(watcher)
    } else {
        None
    };

    if let Some(path) = &config.snapshot.health_path {
        let poller = HealthPoller::new(
            Arc::clone(&handle),
            path,
            Duration::from_secs(config.snapshot.health_poll_secs),
        );
        tasks.push(tokio::spawn(poller.run(shutdown.subscribe())));
    }

    tokio::spawn(handle_signals(config.clone(), Arc::clone(&handle), shutdown.clone()));

    let addr = parse_addr(&config.listener.bind_address)?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;

    let server = InspectionServer::new(Arc::clone(&handle), &config.listener);
    let result = server.run(listener, shutdown.wait()).await;

    shutdown.trigger();
    for task in tasks {
        if tokio::time::timeout(DRAIN_TIMEOUT, task).await.is_err() {
            tracing::warn!("Background task did not stop within the drain window");
        }
    }
    tracing::info!("Router stopped");

    result.map_err(StartupError::Serve)
}

async fn handle_signals(config: RouterConfig, handle: Arc<RouterHandle>, shutdown: Shutdown) {
    loop {
        let event = next_signal().await;
        if on_signal(event, &config, &handle, &shutdown).await.is_break() {
            return;
        }
    }
}

/// Act on one signal. Breaks once shutdown has been triggered.
async fn on_signal(event: SignalEvent, config: &RouterConfig, handle: &RouterHandle, shutdown: &Shutdown) -> ControlFlow<()> {
    match event {
        SignalEvent::Shutdown => {
            tracing::info!("Shutdown signal received");
            shutdown.trigger();
            ControlFlow::Break(())
        }
        SignalEvent::Reload => {
            if let Some(generation) = reload(config, handle).await {
                tracing::info!(generation, "Snapshot reloaded on signal");
            }
            ControlFlow::Continue(())
        }
    }
}

/// Rebuild the router from disk and publish it. A failed rebuild keeps the
/// live snapshot.
pub async fn reload(config: &RouterConfig, handle: &RouterHandle) -> Option<u64> {
    let snapshot = config.snapshot.clone();
    let routing = config.routing.clone();
    let built = tokio::task::spawn_blocking(move || load_router(&snapshot, &routing)).await;

    match built {
        Ok(Ok(router)) => Some(handle.swap(router)),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Reload failed. Keeping current snapshot.");
            None
        }
        Err(e) => {
            tracing::error!(error = %e, "Reload task panicked");
            None
        }
    }
}
