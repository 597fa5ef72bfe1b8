//! Metrics collection and exposition.
//!
//! # Metrics
//! - `router_requests_total` (counter): finished requests by route_type, result
//! - `router_result_details_total` (counter): result details by detail
//! - `router_routing_duration_seconds` (histogram): time spent routing
//! - `router_snapshot_generation` (gauge): generation of the live snapshot
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests and the
//!   library never need an exporter
//! - The Prometheus exporter serves its own listener

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::observability::track::{ResultDetails, Track};

/// Install the Prometheus exporter on `addr` and describe every metric.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!("router_requests_total", "Finished routing requests by route type and result");
    describe_counter!("router_result_details_total", "Finished routing requests by result detail");
    describe_histogram!("router_routing_duration_seconds", "Time spent in the routing cascade");
    describe_gauge!("router_snapshot_generation", "Generation of the live routing snapshot");

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_route(track: &Track) {
    counter!(
        "router_requests_total",
        "route_type" => track.route_type.as_str(),
        "result" => track.result.as_str()
    )
    .increment(1);
    if track.result_details != ResultDetails::NoDetails {
        counter!("router_result_details_total", "detail" => track.result_details.as_str()).increment(1);
    }
    histogram!("router_routing_duration_seconds").record(track.elapsed().as_secs_f64());
}

pub fn record_snapshot_generation(generation: u64) {
    gauge!("router_snapshot_generation").set(generation as f64);
}
