//! Aggregate routing tallies.
//!
//! # Responsibilities
//! - Count finished requests by route type and category
//! - Count result details
//! - Mirror each flush into `metrics` counters for Prometheus
//!
//! # Design Decisions
//! - One flush per request is the only cross-request synchronization point
//! - Tallies are `DashMap` entries of atomics; readers snapshot into BTreeMaps

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

use crate::observability::metrics;
use crate::observability::track::{ResultDetails, ResultType, RouteType, Track};

#[derive(Debug, Default)]
pub struct StatTracker {
    results: DashMap<(RouteType, ResultType), AtomicU64>,
    details: DashMap<ResultDetails, AtomicU64>,
    total: AtomicU64,
}

/// Point-in-time copy of the tallies, keyed by label.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total: u64,
    pub dns: BTreeMap<String, u64>,
    pub http: BTreeMap<String, u64>,
    pub details: BTreeMap<String, u64>,
}

impl StatTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a finished request into the tallies.
    pub fn save(&self, track: &Track) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.results
            .entry((track.route_type, track.result))
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
        if track.result_details != ResultDetails::NoDetails {
            self.details
                .entry(track.result_details)
                .or_default()
                .fetch_add(1, Ordering::Relaxed);
        }
        metrics::record_route(track);
    }

    pub fn count(&self, route_type: RouteType, result: ResultType) -> u64 {
        self.results
            .get(&(route_type, result))
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let mut snapshot = StatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            ..StatsSnapshot::default()
        };
        for entry in self.results.iter() {
            let (route_type, result) = *entry.key();
            let bucket = match route_type {
                RouteType::Dns => &mut snapshot.dns,
                RouteType::Http => &mut snapshot.http,
            };
            bucket.insert(result.as_str().to_string(), entry.value().load(Ordering::Relaxed));
        }
        for entry in self.details.iter() {
            snapshot
                .details
                .insert(entry.key().as_str().to_string(), entry.value().load(Ordering::Relaxed));
        }
        snapshot
    }
}
