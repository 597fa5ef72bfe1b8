//! Health feed polling.
//!
//! # Responsibilities
//! - Periodically read the health feed document
//! - Apply it to the live router through [`RouterHandle`]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::health::HealthFeed;
use crate::state::RouterHandle;

pub struct HealthPoller {
    handle: Arc<RouterHandle>,
    path: PathBuf,
    interval: Duration,
}

impl HealthPoller {
    pub fn new(handle: Arc<RouterHandle>, path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            handle,
            path: path.into(),
            interval,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            path = %self.path.display(),
            interval_secs = self.interval.as_secs(),
            "Health poller starting"
        );

        let mut ticker = time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health poller received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Read and apply the feed once. Failures keep the current state.
    pub async fn poll_once(&self) {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read health feed");
                return;
            }
        };
        match HealthFeed::from_json(&content) {
            Ok(feed) => {
                let summary = self.handle.apply_health(feed);
                if summary.unknown_entries > 0 {
                    tracing::debug!(unknown = summary.unknown_entries, "Health feed names unknown entities");
                }
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Invalid health feed, keeping current state");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::TrafficRouter;
    use crate::topology::{Availability, CacheRegister};

    fn handle() -> Arc<RouterHandle> {
        let doc = r#"{
            "locations": {"loc-1": {"latitude": 1.0, "longitude": 1.0}},
            "caches": {"edge-01": {"locationId": "loc-1", "fqdn": "edge-01.cdn.test"}}
        }"#;
        let register = CacheRegister::from_json(doc).unwrap();
        Arc::new(RouterHandle::new(TrafficRouter::new(Arc::new(register))))
    }

    #[tokio::test]
    async fn test_poll_applies_feed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health.json");
        std::fs::write(&path, r#"{"caches": {"edge-01": {"isAvailable": false}}}"#).unwrap();

        let handle = handle();
        HealthPoller::new(Arc::clone(&handle), &path, Duration::from_secs(1)).poll_once().await;

        let cache = handle.current().register().cache("edge-01").cloned().unwrap();
        assert_eq!(cache.availability(), Availability::Unavailable);
    }

    #[tokio::test]
    async fn test_bad_feed_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health.json");
        std::fs::write(&path, "not json").unwrap();

        let handle = handle();
        HealthPoller::new(Arc::clone(&handle), &path, Duration::from_secs(1)).poll_once().await;
        let cache = handle.current().register().cache("edge-01").cloned().unwrap();
        assert_eq!(cache.availability(), Availability::Unknown);
    }
}
