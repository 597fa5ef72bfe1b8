//! End-to-end routing decisions over the fixture topology.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

use cdn_router::locate::CoverageZoneIndex;
use cdn_router::observability::{ResultDetails, ResultType, RouteType, Track};
use cdn_router::routing::{DnsRequest, QueryType, RouterOptions, STEERING_OPTION_HEADER};
use cdn_router::topology::Geolocation;
use cdn_router::RouterHandle;
use serde_json::json;

mod common;

use common::{http, mark_down, redirect_host, route, CZ_CLIENT, GEO_CLIENT};

#[test]
fn test_coverage_zone_wins_over_geolocation() {
    let router = common::router();
    let (result, track) = route(&router, &http(CZ_CLIENT, "tr.video.cdn.test", "/movies/a.m3u8"));

    assert!(redirect_host(&result).starts_with("edge-east-"));
    assert_eq!(track.result, ResultType::Cz);
    assert!(!track.client_geolocation_queried);
}

#[test]
fn test_unmatched_client_is_geolocated() {
    let router = common::router();
    let (result, track) = route(&router, &http(GEO_CLIENT, "tr.video.cdn.test", "/movies/a.m3u8"));

    assert!(redirect_host(&result).starts_with("edge-west-"));
    assert_eq!(track.result, ResultType::Geo);
    assert!(track.client_geolocation_queried);
}

#[test]
fn test_coverage_zone_only_service_misses_outside_zones() {
    let router = common::router();
    let (result, track) = route(&router, &http(GEO_CLIENT, "tr.czonly.cdn.test", "/a"));

    assert!(result.is_none());
    assert_eq!(track.result, ResultType::Miss);
    assert_eq!(track.result_details, ResultDetails::DsCzOnly);
}

#[test]
fn test_same_request_same_cache() {
    let router = common::router();
    let request = http(CZ_CLIENT, "tr.video.cdn.test", "/movies/b/seg-1.ts");
    let first = redirect_host(&route(&router, &request).0);
    for _ in 0..20 {
        assert_eq!(redirect_host(&route(&router, &request).0), first);
    }
}

#[test]
fn test_unhealthy_zone_falls_back_to_closest_location() {
    let router = common::router();
    mark_down(&router, &["edge-east-1", "edge-east-2"]);

    let (result, track) = route(&router, &http(CZ_CLIENT, "tr.video.cdn.test", "/movies/a.m3u8"));
    assert!(redirect_host(&result).starts_with("edge-west-"));
    assert_eq!(track.result, ResultType::Cz);
    assert_eq!(track.result_details, ResultDetails::DsCzBackupCg);
    assert!(!track.client_geolocation_queried);
}

#[test]
fn test_zone_without_cz_substitute_falls_through_to_geolocation() {
    let mut doc = common::snapshot();
    doc["locations"]["loc-west"]["localizationMethods"] = json!(["GEO"]);
    let router = common::build_router(&doc);
    mark_down(&router, &["edge-east-1", "edge-east-2"]);

    let (result, track) = route(&router, &http(CZ_CLIENT, "tr.video.cdn.test", "/movies/a.m3u8"));
    assert!(redirect_host(&result).starts_with("edge-west-"));
    assert_eq!(track.result, ResultType::Geo);
    assert!(track.client_geolocation_queried);
}

#[test]
fn test_backup_locations_are_tried_in_declared_order() {
    let mut doc = common::snapshot();
    doc["locations"]["loc-far"] = json!({"latitude": -33.9, "longitude": 151.2});
    doc["caches"]["edge-far-1"] = json!({"locationId": "loc-far", "fqdn": "edge-far-1.cdn.test", "ip": "10.0.2.1",
                                         "deliveryServices": {"video": []}});
    doc["locations"]["loc-east"]["backupLocations"] = json!({"list": ["loc-far", "loc-west"], "fallbackToClosest": false});
    let router = common::build_router(&doc);
    let request = http(CZ_CLIENT, "tr.video.cdn.test", "/movies/a.m3u8");

    mark_down(&router, &["edge-east-1", "edge-east-2"]);
    let (result, track) = route(&router, &request);
    assert_eq!(redirect_host(&result), "edge-far-1.video.cdn.test");
    assert_eq!(track.result, ResultType::Cz);
    assert_eq!(track.result_details, ResultDetails::DsCzBackupCg);

    mark_down(&router, &["edge-far-1"]);
    let (result, track) = route(&router, &request);
    assert!(redirect_host(&result).starts_with("edge-west-"));
    assert_eq!(track.result_details, ResultDetails::DsCzBackupCg);

    // Backups exhausted and no closest search: geolocation is not tried either.
    mark_down(&router, &["edge-west-1", "edge-west-2"]);
    let (result, track) = route(&router, &request);
    assert!(result.is_none());
    assert_eq!(track.result, ResultType::Miss);
    assert!(!track.client_geolocation_queried);
}

#[test]
fn test_cz_disabled_location_forbids_geolocation() {
    let mut doc = common::snapshot();
    doc["locations"]["loc-east"]["localizationMethods"] = json!(["GEO"]);
    let router = common::build_router(&doc);

    let (result, track) = route(&router, &http(CZ_CLIENT, "tr.video.cdn.test", "/movies/a.m3u8"));
    assert!(result.is_none());
    assert_eq!(track.result, ResultType::Miss);
    assert_eq!(track.result_details, ResultDetails::DsNoBypass);
    assert!(!track.client_geolocation_queried);
}

#[test]
fn test_location_limit_stops_the_geo_search() {
    let mut doc = common::snapshot();
    doc["deliveryServices"]["video"]["locationFailoverLimit"] = json!(1);
    let router = common::build_router(&doc);
    mark_down(&router, &["edge-west-1", "edge-west-2"]);

    let (result, track) = route(&router, &http(GEO_CLIENT, "tr.video.cdn.test", "/movies/a.m3u8"));
    assert!(result.is_none());
    assert_eq!(track.result, ResultType::Miss);
    assert_eq!(track.result_details, ResultDetails::GeoNoCacheFound);
}

#[test]
fn test_zero_location_limit_searches_every_location() {
    let mut doc = common::snapshot();
    doc["deliveryServices"]["video"]["locationFailoverLimit"] = json!(0);
    let router = common::build_router(&doc);
    mark_down(&router, &["edge-west-1", "edge-west-2"]);

    let (result, track) = route(&router, &http(GEO_CLIENT, "tr.video.cdn.test", "/movies/a.m3u8"));
    assert!(redirect_host(&result).starts_with("edge-east-"));
    assert_eq!(track.result, ResultType::Geo);
}

#[test]
fn test_default_location_client_uses_miss_location() {
    let mut doc = common::snapshot();
    doc["deliveryServices"]["video"]["missLocation"] = json!({"lat": 40.5, "long": -74.5});
    let geo = json!({"networks": [
        {"network": "172.16.0.0/12", "latitude": 39.8, "longitude": -98.6,
         "countryCode": "US", "defaultLocation": true}
    ]});
    let options = RouterOptions {
        default_geolocation_overrides: BTreeMap::from([("US".to_string(), Geolocation::new(39.8, -98.6))]),
        ..RouterOptions::default()
    };
    let router = common::build_router_with(&doc, &geo, options);

    let (result, track) = route(&router, &http("172.16.4.4", "tr.video.cdn.test", "/movies/a.m3u8"));
    assert!(redirect_host(&result).starts_with("edge-east-"));
    assert_eq!(track.result, ResultType::GeoDs);

    // Without a miss location the client stays where the provider put it.
    let (result, track) = route(&router, &http("172.16.4.4", "tr.video-hd.cdn.test", "/movies/a.m3u8"));
    assert!(result.is_some());
    assert_eq!(track.result, ResultType::Geo);
}

#[test]
fn test_deep_coverage_zone_is_preferred() {
    let mut doc = common::snapshot();
    doc["deliveryServices"]["video"]["deepCachingType"] = json!("ALWAYS");
    let deep = CoverageZoneIndex::from_json(
        &json!({"coverageZones": {"loc-west": {"network": ["10.1.0.0/16"], "caches": ["edge-west-2"]}}}).to_string(),
    )
    .unwrap();
    let router = common::build_router(&doc).with_deep_coverage_zones(Arc::new(deep));

    let (result, track) = route(&router, &http(CZ_CLIENT, "tr.video.cdn.test", "/movies/a.m3u8"));
    assert_eq!(redirect_host(&result), "edge-west-2.video.cdn.test");
    assert_eq!(track.result, ResultType::DeepCz);

    // A service that never deep caches keeps its regular zone.
    let (result, track) = route(&router, &http(CZ_CLIENT, "tr.video-hd.cdn.test", "/movies/a.m3u8"));
    assert!(redirect_host(&result).starts_with("edge-east-"));
    assert_eq!(track.result, ResultType::Cz);
}

#[test]
fn test_cz_only_service_redirects_outside_zones() {
    let mut doc = common::snapshot();
    doc["deliveryServices"]["czonly"]["geoLimitRedirectURL"] = json!("http://fallback.example.test/sorry.html");
    let router = common::build_router(&doc);

    let (result, track) = route(&router, &http(GEO_CLIENT, "tr.czonly.cdn.test", "/a"));
    assert_eq!(result.unwrap().url().unwrap().as_str(), "http://fallback.example.test/sorry.html");
    assert_eq!(track.result, ResultType::GeoRedirect);
}

#[test]
fn test_geo_limited_client_is_redirected() {
    let mut doc = common::snapshot();
    doc["deliveryServices"]["video"]["geoEnabled"] = json!([{"countryCode": "CA"}]);
    doc["deliveryServices"]["video"]["geoLimitRedirectURL"] = json!("http://fallback.example.test/sorry.html");
    let router = common::build_router(&doc);

    let (result, track) = route(&router, &http(GEO_CLIENT, "tr.video.cdn.test", "/movies/a.m3u8"));
    assert_eq!(result.unwrap().url().unwrap().as_str(), "http://fallback.example.test/sorry.html");
    assert_eq!(track.result, ResultType::GeoRedirect);

    // Coverage zone clients are not subject to the geo limit.
    let (_, track) = route(&router, &http(CZ_CLIENT, "tr.video.cdn.test", "/movies/a.m3u8"));
    assert_eq!(track.result, ResultType::Cz);
}

#[test]
fn test_geo_limit_redirect_served_by_the_service() {
    let mut doc = common::snapshot();
    doc["deliveryServices"]["video"]["geoEnabled"] = json!([{"countryCode": "CA"}]);
    doc["deliveryServices"]["video"]["geoLimitRedirectURL"] = json!("/blocked.html");
    let router = common::build_router(&doc);

    let (result, track) = route(&router, &http(GEO_CLIENT, "tr.video.cdn.test", "/movies/a.m3u8"));
    let url = result.unwrap().url().unwrap().clone();
    assert!(url.host_str().unwrap().starts_with("edge-west-"));
    assert_eq!(url.path(), "/blocked.html");
    assert_eq!(track.result, ResultType::GeoRedirect);
}

#[test]
fn test_steering_parent_redirects_through_a_target() {
    let router = common::router();
    let (result, _) = route(&router, &http(CZ_CLIENT, "tr.steer.cdn.test", "/content/7/index.m3u8"));
    let result = result.unwrap();

    assert_eq!(result.delivery_services.len(), 1);
    assert!(["video", "video-hd"].contains(&result.delivery_services[0].as_str()));
    assert!(redirect_host(&Some(result)).starts_with("edge-east-"));
}

#[test]
fn test_client_steering_returns_a_url_per_target() {
    let mut doc = common::snapshot();
    doc["steering"][0]["clientSteering"] = json!(true);
    let router = common::build_router(&doc);

    let (result, _) = route(&router, &http(CZ_CLIENT, "tr.steer.cdn.test", "/content/7/index.m3u8"));
    let result = result.unwrap();
    assert!(result.multi_route);
    assert_eq!(result.urls.len(), 2);
}

#[test]
fn test_header_chosen_target_hashes_with_its_own_regex() {
    let mut doc = common::snapshot();
    doc["deliveryServices"]["steer"]["consistentHashRegex"] = json!("/([^/]+)/[^/]+$");
    let router = common::build_router(&doc);
    let client: IpAddr = CZ_CLIENT.parse().unwrap();

    for i in 0..20 {
        let path = format!("/show-{i}/seg.ts");
        let request = http(CZ_CLIENT, "tr.steer.cdn.test", &path).with_header(STEERING_OPTION_HEADER, "video-hd");
        let (result, _) = route(&router, &request);
        let expected = router
            .consistent_hash_for_coverage_zone(client, "video-hd", &path, false)
            .unwrap();
        assert!(redirect_host(&result).starts_with(&format!("{}.", expected.id)), "{path}");
    }
}

#[test]
fn test_hashed_target_inherits_parent_regex() {
    let mut doc = common::snapshot();
    doc["deliveryServices"]["steer"]["consistentHashRegex"] = json!("/([^/]+)/[^/]+$");
    let router = common::build_router(&doc);

    for i in 0..20 {
        let (first, _) = route(&router, &http(CZ_CLIENT, "tr.steer.cdn.test", &format!("/show-{i}/a.ts")));
        let (second, _) = route(&router, &http(CZ_CLIENT, "tr.steer.cdn.test", &format!("/show-{i}/b.ts")));
        assert_eq!(first.as_ref().unwrap().delivery_services, second.as_ref().unwrap().delivery_services);
        assert_eq!(redirect_host(&first), redirect_host(&second));
    }
}

#[test]
fn test_client_steering_hashes_the_parent_path() {
    let mut doc = common::snapshot();
    doc["steering"][0] = json!({
        "deliveryService": "steer",
        "clientSteering": true,
        "targets": [{"deliveryService": "video", "weight": 1}]
    });
    let router = common::build_router(&doc);
    let client: IpAddr = CZ_CLIENT.parse().unwrap();

    // The parent has no regex, so the target's own regex must not apply.
    for i in 0..20 {
        let path = format!("/show-{i}/seg.ts");
        let (result, _) = route(&router, &http(CZ_CLIENT, "tr.steer.cdn.test", &path));
        let result = result.unwrap();
        assert_eq!(result.urls.len(), 1);

        let expected = router
            .consistent_hash_for_coverage_zone(client, "video-hd", &path, false)
            .unwrap();
        let host = result.urls[0].host_str().unwrap();
        assert!(host.starts_with(&format!("{}.", expected.id)), "{path}");
    }
}

#[test]
fn test_dns_answers_with_zone_caches() {
    let router = common::router();
    let request = DnsRequest::new(CZ_CLIENT.parse().unwrap(), "edge.dnsds.cdn.test.", QueryType::A);
    let mut track = Track::new(RouteType::Dns, request.hostname.clone());

    let result = router.route_dns(&request, &mut track).unwrap();
    assert_eq!(result.delivery_service.as_deref(), Some("dnsds"));
    assert_eq!(track.result, ResultType::Cz);

    let mut ips: Vec<IpAddr> = result.addresses.iter().filter_map(|r| r.ip()).collect();
    ips.sort();
    assert_eq!(ips, ["10.0.0.1".parse::<IpAddr>().unwrap(), "10.0.0.2".parse().unwrap()]);
}

#[test]
fn test_dns_for_unknown_name_is_static_route() {
    let router = common::router();
    let request = DnsRequest::new(CZ_CLIENT.parse().unwrap(), "www.elsewhere.test", QueryType::A);
    let mut track = Track::new(RouteType::Dns, request.hostname.clone());

    assert!(router.route_dns(&request, &mut track).is_none());
    assert_eq!(track.result, ResultType::StaticRoute);
}

#[test]
fn test_handle_tallies_every_request() {
    let handle = RouterHandle::new(common::router());
    handle.route_http(&http(CZ_CLIENT, "tr.video.cdn.test", "/a/b.ts"));
    handle.route_http(&http(GEO_CLIENT, "tr.video.cdn.test", "/a/b.ts"));
    handle.route_http(&http(CZ_CLIENT, "tr.nothing.cdn.test", "/a/b.ts"));

    let stats = handle.stats().snapshot();
    assert_eq!(stats.total, 3);
    assert_eq!(handle.stats().count(RouteType::Http, ResultType::Cz), 1);
    assert_eq!(handle.stats().count(RouteType::Http, ResultType::Geo), 1);
    assert_eq!(handle.stats().count(RouteType::Http, ResultType::DsMiss), 1);
}
