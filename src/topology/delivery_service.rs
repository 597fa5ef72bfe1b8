//! Delivery service routing configuration plus live state.
//!
//! # Responsibilities
//! - Hold everything the cascade consults for one service
//! - Geo-limit enforcement (`support_location`)
//! - Redirect URL construction (cache, alternate path, bypass)
//! - Failure responses when the service cannot be served
//!
//! # Design Decisions
//! - Immutable per snapshot except `available` and `disabled_locations`
//! - The hash regex is compiled once; an invalid one is logged and ignored

use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use regex::Regex;
use url::Url;

use crate::hash::Dispersion;
use crate::routing::hash_key::{pattern_based_hash_string, significant_query_params};
use crate::routing::request::HttpRequest;
use crate::routing::result::InetRecord;
use crate::topology::cache::Cache;
use crate::topology::geo::Geolocation;
use crate::topology::location::CacheLocation;
use crate::topology::snapshot::DeliveryServiceDoc;

const STANDARD_HTTP_PORT: u16 = 80;
const STANDARD_HTTPS_PORT: u16 = 443;

/// TTL used for record types the service does not configure.
pub const DEFAULT_TTL: u32 = 60;

/// Which transport a service is routed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Http,
    Dns,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeepCachingType {
    Never,
    Always,
}

/// Whether the geo-limit redirect URL is served by this service itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoRedirectKind {
    /// Relative path, or a URL whose host selects this same service.
    DsUrl,
    /// Points elsewhere: redirect without choosing a cache.
    NotDsUrl,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpBypass {
    pub fqdn: String,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsBypass {
    pub ip: Option<Ipv4Addr>,
    pub ip6: Option<Ipv6Addr>,
    pub cname: Option<String>,
    pub ttl: u32,
}

/// A delivery service.
#[derive(Debug)]
pub struct DeliveryService {
    pub id: String,
    pub routing_name: String,
    pub domain: Option<String>,
    pub kind: ServiceKind,
    pub coverage_zone_only: bool,
    geo_limits: Vec<BTreeMap<String, String>>,
    pub geo_redirect_url: Option<String>,
    pub(crate) geo_redirect_kind: GeoRedirectKind,
    http_bypass: Option<HttpBypass>,
    dns_bypass: Option<DnsBypass>,
    ttls: BTreeMap<String, u32>,
    pub miss_location: Option<Geolocation>,
    pub dispersion: Dispersion,
    pub ip6_routing_enabled: bool,
    pub regional_geo_enabled: bool,
    pub anonymous_blocking_enabled: bool,
    pub geolocation_provider: Option<String>,
    pub ssl_enabled: bool,
    pub accept_http: bool,
    pub accept_https: bool,
    pub redirect_to_https: bool,
    pub deep_caching: DeepCachingType,
    hash_regex: Option<Regex>,
    hash_query_params: BTreeSet<String>,
    pub append_query_string: bool,
    /// Maximum addresses in a DNS answer. 0 answers with every cache.
    pub max_dns_ips: usize,
    /// Geo locations to try before giving up. 0 tries them all.
    pub location_limit: usize,

    available: AtomicBool,
    disabled_locations: ArcSwap<BTreeSet<String>>,
}

impl DeliveryService {
    /// Build a service from its snapshot entry.
    pub fn from_doc(id: &str, doc: &DeliveryServiceDoc) -> Self {
        let kind = if doc
            .matchsets
            .iter()
            .any(|m| m.protocol.eq_ignore_ascii_case("DNS"))
        {
            ServiceKind::Dns
        } else {
            ServiceKind::Http
        };

        let hash_regex = doc
            .consistent_hash_regex
            .as_deref()
            .filter(|r| !r.is_empty())
            .and_then(|r| match Regex::new(r) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(ds = %id, regex = %r, error = %e, "Ignoring invalid consistent hash regex");
                    None
                }
            });

        let deep_caching = match doc.deep_caching_type.to_uppercase().as_str() {
            "ALWAYS" => DeepCachingType::Always,
            "NEVER" | "" => DeepCachingType::Never,
            other => {
                tracing::error!(ds = %id, deep_caching_type = %other, "Unrecognized deepCachingType, defaulting to NEVER");
                DeepCachingType::Never
            }
        };

        let (http_bypass, dns_bypass) = match &doc.bypass_destination {
            Some(bypass) => (
                bypass.http.as_ref().and_then(|h| {
                    h.fqdn.as_ref().map(|fqdn| HttpBypass {
                        fqdn: fqdn.clone(),
                        port: h.port,
                    })
                }),
                bypass.dns.as_ref().map(|d| DnsBypass {
                    ip: d.ip.as_deref().and_then(|ip| parse_or_warn(id, ip)),
                    ip6: d
                        .ip6
                        .as_deref()
                        .filter(|ip| !ip.is_empty())
                        .and_then(|ip| parse_or_warn(id, ip.split('/').next().unwrap_or(ip))),
                    cname: d.cname.clone(),
                    ttl: d.ttl,
                }),
            ),
            None => (None, None),
        };

        let geo_redirect_url = doc
            .geo_limit_redirect_url
            .clone()
            .filter(|u| !u.is_empty());

        Self {
            id: id.to_string(),
            routing_name: doc.routing_name.to_lowercase(),
            domain: doc.domains.first().map(|d| d.to_lowercase()),
            kind,
            coverage_zone_only: doc.coverage_zone_only,
            geo_limits: doc.geo_enabled.clone(),
            geo_redirect_kind: GeoRedirectKind::Invalid,
            geo_redirect_url,
            http_bypass,
            dns_bypass,
            ttls: doc.ttls.clone(),
            miss_location: doc.miss_location.map(|m| Geolocation::new(m.lat, m.lon)),
            dispersion: doc.dispersion,
            ip6_routing_enabled: doc.ip6_routing_enabled,
            regional_geo_enabled: doc.regional_geo_blocking,
            anonymous_blocking_enabled: doc.anonymous_blocking_enabled,
            geolocation_provider: doc.geolocation_provider.clone().filter(|p| !p.is_empty()),
            ssl_enabled: doc.ssl_enabled,
            accept_http: doc.protocol.accept_http,
            accept_https: doc.protocol.accept_https,
            redirect_to_https: doc.protocol.redirect_to_https,
            deep_caching,
            hash_regex,
            hash_query_params: doc
                .consistent_hash_query_params
                .iter()
                .filter(|p| !p.is_empty())
                .cloned()
                .collect(),
            append_query_string: doc.append_query_string,
            max_dns_ips: doc.max_dns_ips_for_location,
            location_limit: doc.location_failover_limit,
            available: AtomicBool::new(true),
            disabled_locations: ArcSwap::from_pointee(BTreeSet::new()),
        }
    }

    // --- Live state ---

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    /// Apply a health report for this service.
    pub fn set_state(&self, available: bool, disabled_locations: BTreeSet<String>) {
        self.available.store(available, Ordering::Relaxed);
        self.disabled_locations.store(Arc::new(disabled_locations));
    }

    pub fn is_location_available(&self, location: &CacheLocation) -> bool {
        !self.disabled_locations.load().contains(&location.id)
    }

    pub fn disabled_locations(&self) -> Arc<BTreeSet<String>> {
        self.disabled_locations.load_full()
    }

    // --- Geo limits ---

    /// Apply geo-limit constraints to a resolved client location.
    ///
    /// An unresolved client falls back to the miss location. A blocked
    /// client yields `None`.
    pub fn support_location(&self, client: Option<Geolocation>) -> Option<Geolocation> {
        match client {
            None => self.miss_location.clone(),
            Some(geo) if self.is_location_blocked(&geo) => None,
            Some(geo) => Some(geo),
        }
    }

    fn is_location_blocked(&self, geo: &Geolocation) -> bool {
        if self.geo_limits.is_empty() {
            return false;
        }
        let allowed = self.geo_limits.iter().any(|constraint| {
            constraint.iter().all(|(key, expected)| {
                geo.property(key)
                    .is_some_and(|actual| actual.eq_ignore_ascii_case(expected))
            })
        });
        !allowed
    }

    /// The miss location, if it is set to something other than 0,0.
    pub fn valid_miss_location(&self) -> Option<&Geolocation> {
        self.miss_location
            .as_ref()
            .filter(|m| m.latitude != 0.0 && m.longitude != 0.0)
    }

    pub fn geo_redirect_kind(&self) -> GeoRedirectKind {
        self.geo_redirect_kind
    }

    /// The path served from a cache for a same-service geo redirect.
    pub fn geo_redirect_path(&self) -> Option<String> {
        let url = self.geo_redirect_url.as_deref()?;
        if !url.contains("://") {
            return Some(if url.starts_with('/') {
                url.to_string()
            } else {
                format!("/{url}")
            });
        }
        Url::parse(url).ok().map(|u| match u.query() {
            Some(q) => format!("{}?{q}", u.path()),
            None => u.path().to_string(),
        })
    }

    // --- Hashing ---

    pub fn hash_regex(&self) -> Option<&Regex> {
        self.hash_regex.as_ref()
    }

    /// Build the consistent hash key for `request`.
    ///
    /// `regex_override` replaces this service's own regex, as a steering
    /// parent does for its targets.
    pub fn hash_key(&self, request: &HttpRequest, regex_override: Option<&Regex>) -> String {
        let mut key = match regex_override.or(self.hash_regex.as_ref()) {
            Some(regex) if !request.path.is_empty() => pattern_based_hash_string(regex, &request.path),
            _ => request.path.clone(),
        };
        key.push_str(&self.significant_query_params(request));
        key
    }

    pub fn significant_query_params(&self, request: &HttpRequest) -> String {
        significant_query_params(request.query.as_deref(), &self.hash_query_params)
    }

    // --- TLS ---

    /// The request's scheme is not accepted by this service.
    pub fn is_tls_mismatch(&self, request: &HttpRequest) -> bool {
        if request.secure {
            !self.ssl_enabled
        } else {
            !self.accept_http
        }
    }

    fn use_secure(&self, request: &HttpRequest) -> bool {
        if request.secure {
            self.accept_https && self.ssl_enabled
        } else {
            self.redirect_to_https && self.accept_https && self.ssl_enabled
        }
    }

    // --- URL construction ---

    fn cache_fqdn(&self, request: &HttpRequest, cache: &Cache) -> String {
        if let Some(fqdn) = cache.fqdn_for(&self.id) {
            return fqdn.to_string();
        }
        let short_name = cache.fqdn.split('.').next().unwrap_or(&cache.fqdn);
        match request.host.split_once('.') {
            Some((_, parent)) => format!("{short_name}.{parent}"),
            None => cache.fqdn.clone(),
        }
    }

    fn build_url(&self, request: &HttpRequest, fqdn: &str, port: u16, path_and_query: &str) -> Result<Url, url::ParseError> {
        let secure = self.use_secure(request);
        let scheme = if secure { "https" } else { "http" };
        let standard = if secure { STANDARD_HTTPS_PORT } else { STANDARD_HTTP_PORT };
        let port = if port == standard {
            String::new()
        } else {
            format!(":{port}")
        };
        Url::parse(&format!("{scheme}://{fqdn}{port}{path_and_query}"))
    }

    fn request_path_and_query(&self, request: &HttpRequest) -> String {
        match (&request.query, self.append_query_string) {
            (Some(q), true) => format!("{}?{q}", request.path),
            _ => request.path.clone(),
        }
    }

    fn cache_port(&self, request: &HttpRequest, cache: &Cache) -> u16 {
        if self.use_secure(request) {
            cache.https_port
        } else {
            cache.port
        }
    }

    /// Redirect URL for `request` served by `cache`.
    pub fn create_url(&self, request: &HttpRequest, cache: &Cache) -> Result<Url, url::ParseError> {
        let fqdn = self.cache_fqdn(request, cache);
        let port = self.cache_port(request, cache);
        self.build_url(request, &fqdn, port, &self.request_path_and_query(request))
    }

    /// Redirect URL serving `alternate_path` from `cache` instead of the requested path.
    pub fn create_url_with_path(&self, request: &HttpRequest, alternate_path: &str, cache: &Cache) -> Result<Url, url::ParseError> {
        let fqdn = self.cache_fqdn(request, cache);
        let port = self.cache_port(request, cache);
        self.build_url(request, &fqdn, port, alternate_path)
    }

    // --- Failure responses ---

    /// The HTTP bypass URL, or `None` when no HTTP bypass is configured.
    pub fn failure_http_url(&self, request: &HttpRequest) -> Option<Url> {
        let bypass = self.http_bypass.as_ref()?;
        let default_port = if request.secure { STANDARD_HTTPS_PORT } else { STANDARD_HTTP_PORT };
        let port = bypass.port.unwrap_or(default_port);
        match self.build_url(request, &bypass.fqdn, port, &self.request_path_and_query(request)) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(ds = %self.id, fqdn = %bypass.fqdn, error = %e, "Unable to build bypass URL");
                None
            }
        }
    }

    pub fn has_dns_bypass(&self) -> bool {
        self.dns_bypass.is_some()
    }

    /// DNS bypass records. Addresses take precedence; a CNAME may not
    /// coexist with them.
    pub fn failure_dns_records(&self) -> Option<Vec<InetRecord>> {
        let bypass = self.dns_bypass.as_ref()?;
        let mut records = Vec::new();
        if bypass.ip.is_some() || bypass.ip6.is_some() {
            if let Some(ip) = bypass.ip {
                records.push(InetRecord::address(IpAddr::V4(ip), bypass.ttl));
            }
            if let Some(ip6) = bypass.ip6 {
                records.push(InetRecord::address(IpAddr::V6(ip6), bypass.ttl));
            }
        } else if let Some(cname) = &bypass.cname {
            records.push(InetRecord::alias(cname.clone(), bypass.ttl));
        }
        Some(records)
    }

    // --- DNS ---

    pub fn ttl(&self, record_type: &str) -> u32 {
        self.ttls.get(record_type).copied().unwrap_or(DEFAULT_TTL)
    }

    /// Address records for `cache` under this service's TTLs.
    pub fn cache_records(&self, cache: &Cache) -> Vec<InetRecord> {
        let mut records = Vec::with_capacity(2);
        if let Some(ip4) = cache.ip4 {
            records.push(InetRecord::address(IpAddr::V4(ip4), self.ttl("A")));
        }
        if self.ip6_routing_enabled {
            if let Some(ip6) = cache.ip6 {
                records.push(InetRecord::address(IpAddr::V6(ip6), self.ttl("AAAA")));
            }
        }
        records
    }
}

fn parse_or_warn<T: std::str::FromStr>(ds_id: &str, raw: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match raw.parse() {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(ds = %ds_id, address = %raw, error = %e, "Ignoring malformed bypass address");
            None
        }
    }
}
