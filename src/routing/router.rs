//! The traffic router: one immutable view of topology plus collaborators.
//!
//! # Responsibilities
//! - Route DNS queries to address records
//! - Route HTTP requests to a redirect URL (or several, for client steering)
//! - Apply post-selection policy hooks to single-answer HTTP results
//! - Answer consistent hash inspection queries
//!
//! # Design Decisions
//! - Immutable after construction; reloads build a new router and swap it
//! - Routing never fails with an error: every outcome is a result category
//!   recorded on the request's [`Track`]
//! - Collaborators sit behind traits so tests and labs can plug in tables

use std::collections::BTreeMap;
use std::sync::Arc;

use url::Url;

use crate::hash::ConsistentHasher;
use crate::locate::{
    CoverageZoneIndex, FederationRegistry, GeolocationProviders, NetworkIndex,
    StaticFederationRegistry,
};
use crate::observability::{ResultDetails, ResultType, RouteType, Track};
use crate::policy::{AnonymousIpPolicy, PolicyDecision, RegionalGeoPolicy};
use crate::routing::hash_key::pattern_based_hash_string_str;
use crate::routing::request::{DnsRequest, HttpRequest, STEERING_OPTION_HEADER};
use crate::routing::result::{DnsRouteResult, HttpRouteResult, InetRecord};
use crate::routing::steering::TargetChoice;
use crate::topology::{Cache, CacheRegister, DeliveryService, GeoRedirectKind, ServiceKind};

/// Query parameters removed from produced URLs when stripping is enabled.
const SPECIAL_QUERY_PARAMS: [&str; 2] = ["fakeClientIpAddress", "format"];

/// Router-wide switches that are not part of the topology snapshot.
#[derive(Debug, Clone, Default)]
pub struct RouterOptions {
    /// Hash DNS answers by hostname instead of shuffling.
    pub consistent_dns_routing: bool,
    pub strip_special_query_params: bool,
    /// Country code → centroid used for clients located only to a country.
    pub default_geolocation_overrides: BTreeMap<String, crate::topology::Geolocation>,
    /// Global switch; a service must also enable anonymous blocking.
    pub anonymous_blocking_enabled: bool,
}

/// Routing decision engine over one topology snapshot.
#[derive(Debug)]
pub struct TrafficRouter {
    pub(crate) register: Arc<CacheRegister>,
    pub(crate) coverage_zones: Arc<dyn NetworkIndex>,
    pub(crate) deep_coverage_zones: Arc<dyn NetworkIndex>,
    pub(crate) federations: Arc<dyn FederationRegistry>,
    pub(crate) geolocation: GeolocationProviders,
    pub(crate) anonymous_ip: Option<Arc<dyn AnonymousIpPolicy>>,
    pub(crate) regional_geo: Option<Arc<dyn RegionalGeoPolicy>>,
    pub(crate) options: RouterOptions,
    pub(crate) hasher: ConsistentHasher,
}

impl TrafficRouter {
    /// A router over `register` with empty indexes and no policies.
    pub fn new(register: Arc<CacheRegister>) -> Self {
        Self {
            register,
            coverage_zones: Arc::new(CoverageZoneIndex::new()),
            deep_coverage_zones: Arc::new(CoverageZoneIndex::new()),
            federations: Arc::new(StaticFederationRegistry::new()),
            geolocation: GeolocationProviders::default(),
            anonymous_ip: None,
            regional_geo: None,
            options: RouterOptions::default(),
            hasher: ConsistentHasher::new(),
        }
    }

    pub fn with_coverage_zones(mut self, index: Arc<dyn NetworkIndex>) -> Self {
        self.coverage_zones = index;
        self
    }

    pub fn with_deep_coverage_zones(mut self, index: Arc<dyn NetworkIndex>) -> Self {
        self.deep_coverage_zones = index;
        self
    }

    pub fn with_federations(mut self, registry: Arc<dyn FederationRegistry>) -> Self {
        self.federations = registry;
        self
    }

    pub fn with_geolocation(mut self, providers: GeolocationProviders) -> Self {
        self.geolocation = providers;
        self
    }

    pub fn with_anonymous_ip(mut self, policy: Arc<dyn AnonymousIpPolicy>) -> Self {
        self.anonymous_ip = Some(policy);
        self
    }

    pub fn with_regional_geo(mut self, policy: Arc<dyn RegionalGeoPolicy>) -> Self {
        self.regional_geo = Some(policy);
        self
    }

    pub fn with_options(mut self, options: RouterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn register(&self) -> &Arc<CacheRegister> {
        &self.register
    }

    pub fn options(&self) -> &RouterOptions {
        &self.options
    }

    // --- DNS ---

    /// Route a DNS query. `None` means no answer beyond what `track` records.
    pub fn route_dns(&self, request: &DnsRequest, track: &mut Track) -> Option<DnsRouteResult> {
        debug_assert_eq!(track.route_type, RouteType::Dns);

        let ds = match self.register.match_dns(&request.hostname) {
            Some(ds) if ds.kind == ServiceKind::Dns && is_routing_name_of(ds, &request.hostname) => Arc::clone(ds),
            _ => {
                track.set(ResultType::StaticRoute, ResultDetails::DsNotFound);
                return None;
            }
        };

        if !ds.is_available() {
            return self.dns_failure(&ds, track);
        }

        let version = request.ip_version();
        let lookup = self.coverage_zone_location(request.client_ip, &ds, false, version);
        if let Some(caches) = self.select_caches_by_cz(&ds, &lookup, track, ResultType::Cz, version) {
            track.client_geolocation = track.result_location.clone();
            return Some(self.dns_answer(&ds, self.dns_records(&ds, &caches, request)));
        }

        if ds.coverage_zone_only {
            track.set(ResultType::Miss, ResultDetails::DsCzOnly);
            return self.dns_failure(&ds, track);
        }

        let federated = self.federations.find_addresses(&ds.id, request.client_ip);
        if !federated.is_empty() {
            track.set_result(ResultType::Fed);
            return Some(self.dns_answer(&ds, federated));
        }

        if lookup.continue_geo {
            if let Some(caches) = self.select_caches_by_geo(request.client_ip, &ds, lookup.location.as_deref(), track, version) {
                if track.result != ResultType::GeoDs {
                    track.set_result(ResultType::Geo);
                }
                return Some(self.dns_answer(&ds, self.dns_records(&ds, &caches, request)));
            }
        }

        track.set_result(ResultType::Miss);
        self.dns_failure(&ds, track)
    }

    fn dns_answer(&self, ds: &DeliveryService, addresses: Vec<InetRecord>) -> DnsRouteResult {
        DnsRouteResult {
            delivery_service: Some(ds.id.clone()),
            addresses,
        }
    }

    /// Address records for the caches chosen to answer `request`.
    fn dns_records(&self, ds: &DeliveryService, caches: &[Arc<Cache>], request: &DnsRequest) -> Vec<InetRecord> {
        let chosen: Vec<&Arc<Cache>> = if ds.max_dns_ips > 0 {
            let shuffle = !self.options.consistent_dns_routing;
            self.hasher.select_hashables(caches, ds.max_dns_ips, &request.hostname, shuffle)
        } else {
            caches.iter().collect()
        };

        chosen.into_iter().flat_map(|cache| ds.cache_records(cache)).collect()
    }

    /// The service's DNS bypass, or `None` with MISS recorded.
    fn dns_failure(&self, ds: &DeliveryService, track: &mut Track) -> Option<DnsRouteResult> {
        if !ds.has_dns_bypass() {
            record_no_bypass(track);
            return None;
        }
        track.set(ResultType::DsRedirect, ResultDetails::DsBypass);
        let records = ds.failure_dns_records()?;
        Some(self.dns_answer(ds, records))
    }

    // --- HTTP ---

    /// Route an HTTP request to one redirect URL, or to several for a
    /// client-steering service.
    pub fn route_http(&self, request: &HttpRequest, track: &mut Track) -> Option<HttpRouteResult> {
        debug_assert_eq!(track.route_type, RouteType::Http);

        let multi = self
            .register
            .match_http(request)
            .and_then(|ds| self.register.steering(&ds.id))
            .is_some_and(|steering| steering.client_steering);

        let mut result = if multi {
            self.multi_route(request, track)
        } else {
            self.single_route(request, track)
        };

        if self.options.strip_special_query_params {
            if let Some(result) = result.as_mut() {
                result.urls.iter_mut().for_each(strip_special_query_params);
            }
        }
        result
    }

    fn single_route(&self, request: &HttpRequest, track: &mut Track) -> Option<HttpRouteResult> {
        let entry = self.register.match_http(request);
        let steering_option = request.header(STEERING_OPTION_HEADER);
        let Some((ds, choice)) = self.resolve_target(entry, request, steering_option) else {
            track.set(ResultType::DsMiss, ResultDetails::DsNotFound);
            return None;
        };

        if ds.is_tls_mismatch(request) {
            track.set(ResultType::Error, ResultDetails::DsTlsMismatch);
            return None;
        }

        let mut result = HttpRouteResult::new(false);
        result.add_delivery_service(ds.id.clone());

        if !ds.is_available() {
            let url = self.http_failure(&ds, request, track)?;
            result.set_url(url);
            return Some(result);
        }

        let caches = self.select_http_caches(request, &ds, track, true).unwrap_or_default();

        if caches.is_empty() {
            if track.result == ResultType::GeoRedirect {
                let url = self.geo_redirect_url(&ds, track)?;
                result.set_url(url);
                return Some(result);
            }
            let url = self.http_failure(&ds, request, track)?;
            result.set_url(url);
            return Some(result);
        }

        // A hashed steering target hashes with its parent's regex.
        let regex_override = entry
            .filter(|_| choice == TargetChoice::Hash)
            .and_then(|entry| entry.hash_regex());
        let hash_key = ds.hash_key(request, regex_override);
        let cache = self.hasher.select_dispersed_one(&caches, &ds.dispersion, &hash_key)?;

        if ds.anonymous_blocking_enabled && self.options.anonymous_blocking_enabled {
            if let Some(policy) = &self.anonymous_ip {
                match policy.enforce(&ds.id, request) {
                    PolicyDecision::Allow => {}
                    PolicyDecision::Block { status } => {
                        track.set_result(ResultType::AnonBlock);
                        result.response_code = Some(status);
                        return Some(result);
                    }
                    PolicyDecision::Redirect { url } => {
                        track.set_result(ResultType::AnonBlock);
                        result.set_url(parse_policy_url(&ds, &url)?);
                        return Some(result);
                    }
                    PolicyDecision::AlternatePath { path } => {
                        track.set_result(ResultType::AnonBlock);
                        result.set_url(build_or_warn(&ds, ds.create_url_with_path(request, &path, cache))?);
                        return Some(result);
                    }
                }
            }
        }

        if ds.regional_geo_enabled {
            if let Some(policy) = &self.regional_geo {
                let client = self.client_geolocation(request.client_ip, &ds, track);
                match policy.enforce(&ds.id, request, client.as_ref()) {
                    PolicyDecision::Allow => {}
                    PolicyDecision::Block { status } => {
                        track.set(ResultType::Rgdeny, ResultDetails::RegionalGeoNoRule);
                        result.response_code = Some(status);
                        return Some(result);
                    }
                    PolicyDecision::Redirect { url } => {
                        track.set(ResultType::Rgalt, ResultDetails::RegionalGeoAlternateWithoutCache);
                        result.set_url(parse_policy_url(&ds, &url)?);
                        return Some(result);
                    }
                    PolicyDecision::AlternatePath { path } => {
                        track.set(ResultType::Rgalt, ResultDetails::RegionalGeoAlternateWithCache);
                        result.set_url(build_or_warn(&ds, ds.create_url_with_path(request, &path, cache))?);
                        return Some(result);
                    }
                }
            }
        }

        if track.result == ResultType::GeoRedirect {
            let path = ds.geo_redirect_path()?;
            result.set_url(build_or_warn(&ds, ds.create_url_with_path(request, &path, cache))?);
            return Some(result);
        }

        result.set_url(build_or_warn(&ds, ds.create_url(request, cache))?);
        Some(result)
    }

    /// The service's HTTP bypass URL, or `None` with MISS recorded.
    pub(crate) fn http_failure(&self, ds: &DeliveryService, request: &HttpRequest, track: &mut Track) -> Option<Url> {
        match ds.failure_http_url(request) {
            Some(url) => {
                track.set(ResultType::DsRedirect, ResultDetails::DsBypass);
                Some(url)
            }
            None => {
                record_no_bypass(track);
                None
            }
        }
    }

    /// Absolute geo-limit redirect for a redirect that is not served by the service.
    fn geo_redirect_url(&self, ds: &DeliveryService, track: &mut Track) -> Option<Url> {
        if ds.geo_redirect_kind() != GeoRedirectKind::NotDsUrl {
            return None;
        }
        let raw = ds.geo_redirect_url.as_deref()?;
        match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::error!(ds = %ds.id, url = %raw, error = %e, "Invalid geo-limit redirect URL");
                track.set(ResultType::Miss, ResultDetails::GeoNoCacheFound);
                None
            }
        }
    }

    // --- Inspection ---

    /// The cache a coverage zone client would be sent to for `request_path`.
    pub fn consistent_hash_for_coverage_zone(
        &self,
        ip: std::net::IpAddr,
        ds_id: &str,
        request_path: &str,
        deep: bool,
    ) -> Option<Arc<Cache>> {
        let ds = self.register.delivery_service(ds_id)?;
        let request = inspection_request(ip, request_path);
        let version = request.ip_version();
        let mut track = Track::new(RouteType::Http, ds_id);

        let lookup = self.coverage_zone_location(ip, ds, deep, version);
        let result = if deep { ResultType::DeepCz } else { ResultType::Cz };
        let caches = self.select_caches_by_cz(ds, &lookup, &mut track, result, version)?;
        self.inspect_pick(ds, &caches, &request)
    }

    /// The cache a geolocated client would be sent to for `request_path`.
    pub fn consistent_hash_for_geolocation(&self, ip: std::net::IpAddr, ds_id: &str, request_path: &str) -> Option<Arc<Cache>> {
        let ds = self.register.delivery_service(ds_id)?;
        let request = inspection_request(ip, request_path);
        let mut track = Track::new(RouteType::Http, ds_id);

        let caches = self.select_caches_by_geo(ip, ds, None, &mut track, request.ip_version())?;
        self.inspect_pick(ds, &caches, &request)
    }

    /// The steering target `request_path` hashes to. A plain service maps to itself.
    pub fn consistent_hash_steering(&self, ds_id: &str, request_path: &str) -> Option<Arc<DeliveryService>> {
        let entry = self.register.delivery_service(ds_id)?;
        let request = inspection_request(std::net::IpAddr::from([0, 0, 0, 0]), request_path);
        self.consistent_hash_delivery_service(Some(entry), &request, None)
    }

    /// The hash key `regex` extracts from `request_path`.
    pub fn pattern_based_hash(&self, regex: &str, request_path: &str) -> String {
        pattern_based_hash_string_str(regex, request_path)
    }

    fn inspect_pick(&self, ds: &DeliveryService, caches: &[Arc<Cache>], request: &HttpRequest) -> Option<Arc<Cache>> {
        let key = ds.hash_key(request, None);
        self.hasher.select_dispersed_one(caches, &ds.dispersion, &key).cloned()
    }
}

/// The hostname is `<routing name>.<service domain>`.
fn is_routing_name_of(ds: &DeliveryService, hostname: &str) -> bool {
    hostname
        .strip_prefix(ds.routing_name.as_str())
        .is_some_and(|rest| rest.starts_with('.'))
}

/// Record MISS, keeping a more specific detail if one is already set.
fn record_no_bypass(track: &mut Track) {
    track.set_result(ResultType::Miss);
    if track.result_details == ResultDetails::NoDetails {
        track.set_details(ResultDetails::DsNoBypass);
    }
}

fn inspection_request(ip: std::net::IpAddr, request_path: &str) -> HttpRequest {
    match request_path.split_once('?') {
        Some((path, query)) => HttpRequest::new(ip, "", path).with_query(query),
        None => HttpRequest::new(ip, "", request_path),
    }
}

fn parse_policy_url(ds: &DeliveryService, raw: &str) -> Option<Url> {
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!(ds = %ds.id, url = %raw, error = %e, "Policy returned an invalid URL");
            None
        }
    }
}

fn build_or_warn(ds: &DeliveryService, built: Result<Url, url::ParseError>) -> Option<Url> {
    match built {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!(ds = %ds.id, error = %e, "Unable to build redirect URL");
            None
        }
    }
}

fn strip_special_query_params(url: &mut Url) {
    if url.query().is_none() {
        return;
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !SPECIAL_QUERY_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
}
