//! Inspection API over an in-process router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use cdn_router::config::ListenerConfig;
use cdn_router::{InspectionServer, RouterHandle};
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

fn app() -> (Router, Arc<RouterHandle>) {
    let handle = Arc::new(RouterHandle::new(common::router()));
    let server = InspectionServer::new(Arc::clone(&handle), &ListenerConfig::default());
    (server.router(), handle)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

#[tokio::test]
async fn test_coverage_zone_cache_lookup() {
    let (app, _) = app();
    let (status, body) = get(
        app,
        "/crs/consistenthash/cache/coveragezone?ip=10.1.0.7&deliveryServiceId=video&requestPath=/a/x.m3u8",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["locationId"], "loc-east");
}

#[tokio::test]
async fn test_geolocation_cache_lookup() {
    let (app, _) = app();
    let (status, body) = get(
        app,
        "/crs/consistenthash/cache/geolocation?ip=192.168.7.7&deliveryServiceId=video&requestPath=/a/x.m3u8",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["locationId"], "loc-west");
}

#[tokio::test]
async fn test_steering_lookup_and_pattern() {
    let (app, _) = app();
    let (status, body) = get(
        app.clone(),
        "/crs/consistenthash/deliveryservice?deliveryServiceId=steer&requestPath=/content/1/index.m3u8",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["id"] == "video" || body["id"] == "video-hd");

    let (status, body) = get(
        app,
        "/crs/consistenthash/patternbased/regex?regex=%2F%28%5B%5E%2F%5D%2B%29%2F%5B%5E%2F%5D%2B%24&requestPath=/a/x.m3u8",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["patternBasedHash"], "a");
}

#[tokio::test]
async fn test_route_endpoints_report_track() {
    let (app, handle) = app();
    let (status, body) = get(app.clone(), "/crs/route/http?ip=10.1.0.7&host=tr.video.cdn.test&path=/a/b.ts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["track"]["result"], "CZ");
    assert!(body["result"]["urls"][0].as_str().unwrap().contains("edge-east-"));

    let (status, body) = get(app.clone(), "/crs/route/dns?ip=10.1.0.7&name=edge.dnsds.cdn.test&type=A").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["delivery_service"], "dnsds");

    let (status, _) = get(app.clone(), "/crs/route/dns?ip=10.1.0.7&name=edge.dnsds.cdn.test&type=MX").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, stats) = get(app, "/crs/stats").await;
    assert_eq!(stats["total"], 2);
    assert_eq!(handle.stats().snapshot().total, 2);
}

#[tokio::test]
async fn test_posted_health_feed_takes_caches_down() {
    let (app, handle) = app();
    let feed = json!({"caches": {
        "edge-east-1": {"isAvailable": false},
        "edge-east-2": {"isAvailable": false},
        "edge-gone": {"isAvailable": true}
    }});
    let request = Request::post("/crs/state")
        .header("content-type", "application/json")
        .body(Body::from(feed.to_string()))
        .unwrap();

    let (status, summary) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["caches_unavailable"], 2);
    assert_eq!(summary["unknown_entries"], 1);

    let (_, status_body) = get(app, "/crs/status").await;
    assert_eq!(status_body["cachesUnavailable"], 2);
    assert_eq!(status_body["generation"], handle.generation());
}

#[tokio::test]
async fn test_malformed_health_feed_is_rejected() {
    let (app, _) = app();
    let request = Request::post("/crs/state").body(Body::from("{ nope")).unwrap();
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("health feed"));
}
