//! The live routing snapshot.
//!
//! # Data Flow
//! ```text
//! config::watcher / startup
//!     → build TrafficRouter off the hot path
//!     → RouterHandle::swap (atomic pointer replacement)
//!     → re-apply the last health feed to the new register
//!
//! request
//!     → RouterHandle::route_* (load current snapshot, new Track)
//!     → TrafficRouter cascade
//!     → StatTracker::save (the only cross-request write)
//! ```
//!
//! # Design Decisions
//! - In-flight requests keep the snapshot they loaded; a swap never
//!   blocks them
//! - No ambient statics: the handle is created once and passed around

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};

use crate::health::{HealthFeed, HealthSummary};
use crate::observability::{metrics, RouteType, StatTracker, Track};
use crate::routing::{DnsRequest, DnsRouteResult, HttpRequest, HttpRouteResult, TrafficRouter};

#[derive(Debug)]
pub struct RouterHandle {
    current: ArcSwap<TrafficRouter>,
    generation: AtomicU64,
    last_health: ArcSwapOption<HealthFeed>,
    stats: StatTracker,
}

impl RouterHandle {
    pub fn new(router: TrafficRouter) -> Self {
        metrics::record_snapshot_generation(1);
        Self {
            current: ArcSwap::from_pointee(router),
            generation: AtomicU64::new(1),
            last_health: ArcSwapOption::empty(),
            stats: StatTracker::new(),
        }
    }

    /// The live router. Callers hold it for the duration of one request.
    pub fn current(&self) -> Arc<TrafficRouter> {
        self.current.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> &StatTracker {
        &self.stats
    }

    /// Publish `router` and return the new generation.
    ///
    /// The last health feed is applied to the incoming register first, so
    /// known-down caches stay down across a reload.
    pub fn swap(&self, router: TrafficRouter) -> u64 {
        if let Some(feed) = self.last_health.load_full() {
            feed.apply(router.register());
        }
        self.current.store(Arc::new(router));
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::record_snapshot_generation(generation);
        tracing::info!(generation, "Routing snapshot published");
        generation
    }

    /// Apply a health feed to the live router and keep it for later swaps.
    pub fn apply_health(&self, feed: HealthFeed) -> HealthSummary {
        let summary = feed.apply(self.current().register());
        self.last_health.store(Some(Arc::new(feed)));
        tracing::debug!(?summary, "Health feed applied");
        summary
    }

    pub fn route_http(&self, request: &HttpRequest) -> (Option<HttpRouteResult>, Track) {
        let router = self.current();
        let mut track = Track::new(RouteType::Http, request.host.clone());
        let result = router.route_http(request, &mut track);
        self.stats.save(&track);
        (result, track)
    }

    pub fn route_dns(&self, request: &DnsRequest) -> (Option<DnsRouteResult>, Track) {
        let router = self.current();
        let mut track = Track::new(RouteType::Dns, request.hostname.clone());
        let result = router.route_dns(request, &mut track);
        self.stats.save(&track);
        (result, track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::ResultType;
    use crate::topology::{Availability, CacheRegister};
    use serde_json::json;

    fn router(cache_id: &str) -> TrafficRouter {
        let doc = json!({
            "locations": {"loc-1": {"latitude": 1.0, "longitude": 1.0}},
            "caches": {cache_id: {"locationId": "loc-1", "fqdn": format!("{cache_id}.cdn.test"),
                                  "deliveryServices": {"ds-a": []}}},
            "deliveryServices": {"ds-a": {}}
        });
        TrafficRouter::new(Arc::new(CacheRegister::from_json(&doc.to_string()).unwrap()))
    }

    #[test]
    fn test_swap_bumps_generation() {
        let handle = RouterHandle::new(router("edge-01"));
        assert_eq!(handle.generation(), 1);
        let held = handle.current();

        assert_eq!(handle.swap(router("edge-02")), 2);
        assert!(held.register().cache("edge-01").is_some());
        assert!(handle.current().register().cache("edge-02").is_some());
    }

    #[test]
    fn test_health_survives_swap() {
        let handle = RouterHandle::new(router("edge-01"));
        let feed = HealthFeed::from_json(r#"{"caches": {"edge-01": {"isAvailable": false}}}"#).unwrap();
        handle.apply_health(feed);

        handle.swap(router("edge-01"));
        let cache = handle.current().register().cache("edge-01").cloned().unwrap();
        assert_eq!(cache.availability(), Availability::Unavailable);
    }

    #[test]
    fn test_routes_are_tallied() {
        let handle = RouterHandle::new(router("edge-01"));
        let request = HttpRequest::new("10.0.0.1".parse().unwrap(), "nowhere.test", "/");
        let (result, track) = handle.route_http(&request);
        assert!(result.is_none());
        assert_eq!(track.result, ResultType::DsMiss);
        assert_eq!(handle.stats().count(RouteType::Http, ResultType::DsMiss), 1);
    }
}
