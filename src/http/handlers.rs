//! Inspection API handlers.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::health::{HealthFeed, HealthSummary};
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::observability::{StatsSnapshot, Track};
use crate::routing::{DnsRequest, DnsRouteResult, HttpRequest, HttpRouteResult, QueryType, STEERING_OPTION_HEADER};
use crate::topology::{Availability, Cache, DeliveryService};

/// Public face of a cache.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheView {
    pub id: String,
    pub fqdn: String,
    pub location_id: String,
    pub ip4: Option<Ipv4Addr>,
    pub ip6: Option<Ipv6Addr>,
    pub port: u16,
    pub https_port: u16,
    pub availability: String,
}

impl From<&Cache> for CacheView {
    fn from(cache: &Cache) -> Self {
        let availability = match cache.availability() {
            Availability::Unknown => "unknown",
            Availability::Available => "available",
            Availability::Unavailable => "unavailable",
        };
        Self {
            id: cache.id.clone(),
            fqdn: cache.fqdn.clone(),
            location_id: cache.location_id.clone(),
            ip4: cache.ip4,
            ip6: cache.ip6,
            port: cache.port,
            https_port: cache.https_port,
            availability: availability.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryServiceView {
    pub id: String,
    pub routing_name: String,
    pub domain: Option<String>,
}

impl From<&DeliveryService> for DeliveryServiceView {
    fn from(ds: &DeliveryService) -> Self {
        Self {
            id: ds.id.clone(),
            routing_name: ds.routing_name.clone(),
            domain: ds.domain.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheHashParams {
    pub ip: String,
    pub delivery_service_id: String,
    pub request_path: String,
    #[serde(default)]
    pub deep: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SteeringHashParams {
    pub delivery_service_id: String,
    pub request_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternParams {
    pub regex: String,
    pub request_path: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatternResponse {
    pub regex: String,
    pub request_path: String,
    pub pattern_based_hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteParams {
    pub ip: String,
    pub host: String,
    #[serde(default = "root_path")]
    pub path: String,
    pub query: Option<String>,
    #[serde(default)]
    pub secure: bool,
    pub steering_option: Option<String>,
}

fn root_path() -> String {
    "/".to_string()
}

#[derive(Debug, Deserialize)]
pub struct DnsRouteParams {
    pub ip: String,
    pub name: String,
    #[serde(rename = "type")]
    pub query_type: Option<String>,
}

/// A routing decision together with the trace that produced it.
#[derive(Debug, Serialize)]
pub struct RouteResponse<T> {
    pub result: Option<T>,
    pub track: Track,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouterStatus {
    pub generation: u64,
    pub caches: usize,
    pub caches_unavailable: usize,
    pub locations: usize,
    pub delivery_services: usize,
}

fn parse_ip(raw: &str) -> Result<IpAddr, ApiError> {
    raw.parse().map_err(|e| ApiError::invalid("ip", e))
}

pub async fn cache_for_coverage_zone(
    State(state): State<AppState>,
    Query(params): Query<CacheHashParams>,
) -> Result<Json<CacheView>, ApiError> {
    let ip = parse_ip(&params.ip)?;
    let router = state.handle.current();
    let cache = router
        .consistent_hash_for_coverage_zone(ip, &params.delivery_service_id, &params.request_path, params.deep)
        .ok_or_else(|| ApiError::NotFound(format!("cache for {ip} in coverage zone")))?;
    Ok(Json(CacheView::from(cache.as_ref())))
}

pub async fn cache_for_geolocation(
    State(state): State<AppState>,
    Query(params): Query<CacheHashParams>,
) -> Result<Json<CacheView>, ApiError> {
    let ip = parse_ip(&params.ip)?;
    let router = state.handle.current();
    let cache = router
        .consistent_hash_for_geolocation(ip, &params.delivery_service_id, &params.request_path)
        .ok_or_else(|| ApiError::NotFound(format!("cache for {ip} by geolocation")))?;
    Ok(Json(CacheView::from(cache.as_ref())))
}

pub async fn steering_target(
    State(state): State<AppState>,
    Query(params): Query<SteeringHashParams>,
) -> Result<Json<DeliveryServiceView>, ApiError> {
    let router = state.handle.current();
    let ds = router
        .consistent_hash_steering(&params.delivery_service_id, &params.request_path)
        .ok_or_else(|| ApiError::NotFound(format!("delivery service '{}'", params.delivery_service_id)))?;
    Ok(Json(DeliveryServiceView::from(ds.as_ref())))
}

pub async fn pattern_based(
    State(state): State<AppState>,
    Query(params): Query<PatternParams>,
) -> Json<PatternResponse> {
    let hash = state.handle.current().pattern_based_hash(&params.regex, &params.request_path);
    Json(PatternResponse {
        regex: params.regex,
        request_path: params.request_path,
        pattern_based_hash: hash,
    })
}

pub async fn route_http(
    State(state): State<AppState>,
    Query(params): Query<HttpRouteParams>,
) -> Result<Json<RouteResponse<HttpRouteResult>>, ApiError> {
    let ip = parse_ip(&params.ip)?;
    let mut request = HttpRequest::new(ip, params.host, params.path).with_secure(params.secure);
    if let Some(query) = params.query {
        request = request.with_query(query);
    }
    if let Some(option) = params.steering_option {
        request = request.with_header(STEERING_OPTION_HEADER, option);
    }

    let (result, track) = state.handle.route_http(&request);
    Ok(Json(RouteResponse { result, track }))
}

pub async fn route_dns(
    State(state): State<AppState>,
    Query(params): Query<DnsRouteParams>,
) -> Result<Json<RouteResponse<DnsRouteResult>>, ApiError> {
    let ip = parse_ip(&params.ip)?;
    let query_type = match params.query_type.as_deref().map(str::to_uppercase).as_deref() {
        None | Some("A") => QueryType::A,
        Some("AAAA") => QueryType::Aaaa,
        Some(other) => return Err(ApiError::invalid("type", format!("unsupported record type '{other}'"))),
    };

    let (result, track) = state.handle.route_dns(&DnsRequest::new(ip, params.name, query_type));
    Ok(Json(RouteResponse { result, track }))
}

pub async fn get_stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.handle.stats().snapshot())
}

pub async fn get_status(State(state): State<AppState>) -> Json<RouterStatus> {
    let router = state.handle.current();
    let register = router.register();
    Json(RouterStatus {
        generation: state.handle.generation(),
        caches: register.caches().count(),
        caches_unavailable: register
            .caches()
            .filter(|c| c.availability() == Availability::Unavailable)
            .count(),
        locations: register.locations().count(),
        delivery_services: register.delivery_services().count(),
    })
}

/// Apply a health feed posted as JSON.
pub async fn post_state(State(state): State<AppState>, body: String) -> Result<Json<HealthSummary>, ApiError> {
    let feed = HealthFeed::from_json(&body)?;
    let summary = state.handle.apply_health(feed);
    Ok(Json(summary))
}
