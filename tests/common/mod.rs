//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use cdn_router::config::RouterConfig;
use cdn_router::health::HealthFeed;
use cdn_router::locate::{CoverageZoneIndex, GeolocationProviders, StaticGeolocation};
use cdn_router::observability::{RouteType, Track};
use cdn_router::routing::{HttpRequest, HttpRouteResult, RouterOptions, TrafficRouter};
use cdn_router::topology::CacheRegister;
use serde_json::{json, Value};

/// Client inside the east coverage zone.
pub const CZ_CLIENT: &str = "10.1.0.7";
/// Client only the geolocation table knows about, closest to the west.
pub const GEO_CLIENT: &str = "192.168.7.7";

/// Two locations, four caches, plain HTTP and DNS services and one
/// steering parent splitting 1:3 between two targets.
pub fn snapshot() -> Value {
    json!({
        "locations": {
            "loc-east": {"latitude": 40.0, "longitude": -75.0},
            "loc-west": {"latitude": 37.0, "longitude": -122.0}
        },
        "caches": {
            "edge-east-1": {"locationId": "loc-east", "fqdn": "edge-east-1.cdn.test", "ip": "10.0.0.1",
                            "deliveryServices": {"video": [], "video-hd": [], "dnsds": [], "czonly": []}},
            "edge-east-2": {"locationId": "loc-east", "fqdn": "edge-east-2.cdn.test", "ip": "10.0.0.2",
                            "deliveryServices": {"video": [], "video-hd": [], "dnsds": [], "czonly": []}},
            "edge-west-1": {"locationId": "loc-west", "fqdn": "edge-west-1.cdn.test", "ip": "10.0.1.1",
                            "deliveryServices": {"video": [], "video-hd": [], "dnsds": []}},
            "edge-west-2": {"locationId": "loc-west", "fqdn": "edge-west-2.cdn.test", "ip": "10.0.1.2",
                            "deliveryServices": {"video": [], "video-hd": [], "dnsds": []}}
        },
        "deliveryServices": {
            "video": {
                "routingName": "tr",
                "matchsets": [{"protocol": "HTTP", "matchlist": [{"regex": ".*\\.video\\..*", "match-type": "HOST"}]}],
                "consistentHashRegex": "/([^/]+)/[^/]+$"
            },
            "video-hd": {
                "routingName": "tr",
                "matchsets": [{"protocol": "HTTP", "matchlist": [{"regex": ".*\\.video-hd\\..*", "match-type": "HOST"}]}]
            },
            "czonly": {
                "routingName": "tr",
                "coverageZoneOnly": true,
                "matchsets": [{"protocol": "HTTP", "matchlist": [{"regex": ".*\\.czonly\\..*", "match-type": "HOST"}]}]
            },
            "dnsds": {
                "routingName": "edge",
                "matchsets": [{"protocol": "DNS", "matchlist": [{"regex": ".*\\.dnsds\\..*", "match-type": "HOST"}]}]
            },
            "steer": {
                "routingName": "tr",
                "matchsets": [{"protocol": "HTTP", "matchlist": [{"regex": ".*\\.steer\\..*", "match-type": "HOST"}]}]
            }
        },
        "steering": [{
            "deliveryService": "steer",
            "targets": [
                {"deliveryService": "video", "weight": 1},
                {"deliveryService": "video-hd", "weight": 3}
            ]
        }]
    })
}

pub fn coverage_zones() -> Value {
    json!({"coverageZones": {"loc-east": {
        "network": ["10.1.0.0/16"],
        "coordinates": {"latitude": 40.0, "longitude": -75.0}
    }}})
}

/// The whole 10/8 sits near the west location, so a client that also
/// matches the coverage zone tells the two steps apart.
pub fn geolocation() -> Value {
    json!({"networks": [
        {"network": "192.168.0.0/16", "latitude": 37.5, "longitude": -121.0},
        {"network": "10.0.0.0/8", "latitude": 37.5, "longitude": -121.0}
    ]})
}

pub fn build_router(doc: &Value) -> TrafficRouter {
    build_router_with(
        doc,
        &geolocation(),
        RouterOptions {
            consistent_dns_routing: true,
            ..RouterOptions::default()
        },
    )
}

/// Like [`build_router`] with a custom geolocation table and options.
pub fn build_router_with(doc: &Value, geo: &Value, options: RouterOptions) -> TrafficRouter {
    let register = CacheRegister::from_json(&doc.to_string()).unwrap();
    let zones = CoverageZoneIndex::from_json(&coverage_zones().to_string()).unwrap();
    let geo = StaticGeolocation::from_json(&geo.to_string()).unwrap();

    TrafficRouter::new(Arc::new(register))
        .with_coverage_zones(Arc::new(zones))
        .with_geolocation(GeolocationProviders::new(Arc::new(geo)))
        .with_options(options)
}

/// Report `caches` unavailable through the health feed.
pub fn mark_down(router: &TrafficRouter, caches: &[&str]) {
    let entries: serde_json::Map<String, Value> = caches
        .iter()
        .map(|id| (id.to_string(), json!({"isAvailable": false})))
        .collect();
    let feed = HealthFeed::from_json(&json!({ "caches": entries }).to_string()).unwrap();
    feed.apply(router.register());
}

pub fn router() -> TrafficRouter {
    build_router(&snapshot())
}

pub fn http(ip: &str, host: &str, path: &str) -> HttpRequest {
    HttpRequest::new(ip.parse().unwrap(), host, path)
}

pub fn route(router: &TrafficRouter, request: &HttpRequest) -> (Option<HttpRouteResult>, Track) {
    let mut track = Track::new(RouteType::Http, request.host.clone());
    let result = router.route_http(request, &mut track);
    (result, track)
}

/// Host of the single redirect URL.
pub fn redirect_host(result: &Option<HttpRouteResult>) -> String {
    result
        .as_ref()
        .and_then(|r| r.url())
        .and_then(|u| u.host_str())
        .unwrap_or_default()
        .to_string()
}

/// Write the fixture documents into `dir` and return a config naming them.
pub fn write_documents(dir: &Path, doc: &Value) -> RouterConfig {
    let write = |name: &str, value: &Value| {
        let path = dir.join(name);
        std::fs::write(&path, value.to_string()).unwrap();
        path.to_string_lossy().into_owned()
    };

    let mut config = RouterConfig::default();
    config.snapshot.path = write("snapshot.json", doc);
    config.snapshot.coverage_zone_path = Some(write("czmap.json", &coverage_zones()));
    config.snapshot.geolocation_path = Some(write("geo.json", &geolocation()));
    config.routing.consistent_dns_routing = true;
    config
}
