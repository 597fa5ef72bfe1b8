//! Snapshot file watcher for hot reload.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_router;
use crate::config::schema::{RoutingConfig, SnapshotConfig};
use crate::routing::TrafficRouter;
use crate::state::RouterHandle;

/// A watcher that rebuilds the router when any topology document changes.
pub struct SnapshotWatcher {
    snapshot: SnapshotConfig,
    routing: RoutingConfig,
    update_tx: mpsc::UnboundedSender<TrafficRouter>,
}

impl SnapshotWatcher {
    /// Create a new SnapshotWatcher.
    ///
    /// Returns the watcher and a receiver for freshly built routers.
    pub fn new(snapshot: SnapshotConfig, routing: RoutingConfig) -> (Self, mpsc::UnboundedReceiver<TrafficRouter>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                snapshot,
                routing,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching in a background thread.
    ///
    /// Parent directories are watched so documents replaced by rename are
    /// still seen. A failed rebuild keeps the current router.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let files: BTreeSet<PathBuf> = self.snapshot.watched_paths().into_iter().map(absolute).collect();
        let dirs: BTreeSet<PathBuf> = files
            .iter()
            .filter_map(|f| f.parent().map(Path::to_path_buf))
            .collect();

        let tx = self.update_tx.clone();
        let snapshot = self.snapshot.clone();
        let routing = self.routing.clone();
        let watched = files.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = (event.kind.is_modify() || event.kind.is_create())
                        && event.paths.iter().any(|p| watched.contains(p));
                    if !relevant {
                        return;
                    }
                    tracing::info!(paths = ?event.paths, "Snapshot change detected, rebuilding router");
                    match load_router(&snapshot, &routing) {
                        Ok(router) => {
                            let _ = tx.send(router);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to rebuild router. Keeping current snapshot.");
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        for dir in &dirs {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
        }

        tracing::info!(files = ?files, "Snapshot watcher started");
        Ok(watcher)
    }
}

/// Publish every router received on `updates` until the channel closes.
pub async fn apply_updates(handle: Arc<RouterHandle>, mut updates: mpsc::UnboundedReceiver<TrafficRouter>) {
    while let Some(router) = updates.recv().await {
        handle.swap(router);
    }
}

fn absolute(path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}
