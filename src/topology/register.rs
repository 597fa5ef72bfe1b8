//! The cache register: every live entity of one snapshot.
//!
//! # Data Flow
//! ```text
//! Snapshot (JSON document)
//!     → caches (addresses parsed, replicas generated)
//!     → locations (caches attached by primary location)
//!     → delivery services + request matchers
//!     → steering (weighted targets)
//!     → CacheRegister (immutable, shared behind Arc)
//! ```
//!
//! # Design Decisions
//! - Built once per snapshot and never mutated apart from availability flags
//! - Dangling cache locations and malformed addresses reject the snapshot;
//!   dangling backups and steering targets are logged and skipped

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

use thiserror::Error;
use url::Url;

use crate::routing::matcher::{sort_matchers, AndMatcher, HeaderMatcher, HostMatcher, Matcher, PathMatcher, ServiceMatcher};
use crate::routing::request::HttpRequest;
use crate::topology::cache::{Cache, DEFAULT_HASH_COUNT};
use crate::topology::delivery_service::{DeliveryService, GeoRedirectKind};
use crate::topology::geo::Geolocation;
use crate::topology::location::{CacheLocation, LocalizationMethod};
use crate::topology::snapshot::{DeliveryServiceDoc, Snapshot};
use crate::topology::steering::Steering;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("cache '{cache}' references unknown location '{location}'")]
    UnknownLocation { cache: String, location: String },

    #[error("cache '{cache}' has malformed address '{address}'")]
    InvalidAddress { cache: String, address: String },

    #[error("delivery service '{ds}' has invalid {kind} pattern '{pattern}': {source}")]
    InvalidPattern {
        ds: String,
        kind: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("delivery service '{ds}' has unknown match type '{kind}'")]
    UnknownMatchType { ds: String, kind: String },

    #[error("steering entry references unknown delivery service '{0}'")]
    UnknownSteeringService(String),

    #[error("invalid network '{network}' for '{owner}': {reason}")]
    InvalidNetwork {
        owner: String,
        network: String,
        reason: String,
    },
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Live topology for one snapshot.
#[derive(Debug, Default)]
pub struct CacheRegister {
    caches: BTreeMap<String, Arc<Cache>>,
    locations: BTreeMap<String, Arc<CacheLocation>>,
    delivery_services: BTreeMap<String, Arc<DeliveryService>>,
    steering: BTreeMap<String, Arc<Steering>>,
    http_matchers: Vec<ServiceMatcher>,
    dns_matchers: Vec<ServiceMatcher>,
}

impl CacheRegister {
    /// Parse and build a register from a JSON snapshot document.
    pub fn from_json(json: &str) -> SnapshotResult<Self> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        Self::from_snapshot(&snapshot)
    }

    pub fn from_snapshot(snapshot: &Snapshot) -> SnapshotResult<Self> {
        let caches = build_caches(snapshot)?;
        let locations = build_locations(snapshot, &caches);

        let mut services: BTreeMap<String, DeliveryService> = snapshot
            .delivery_services
            .iter()
            .map(|(id, doc)| (id.clone(), DeliveryService::from_doc(id, doc)))
            .collect();

        let (http_matchers, dns_matchers) = build_matchers(&snapshot.delivery_services)?;

        for ds in services.values_mut() {
            if let Some(url) = ds.geo_redirect_url.as_deref() {
                ds.geo_redirect_kind = geo_redirect_kind(&ds.id, url, &http_matchers);
            }
        }

        let mut steering = BTreeMap::new();
        for doc in &snapshot.steering {
            if !services.contains_key(&doc.delivery_service) {
                return Err(SnapshotError::UnknownSteeringService(doc.delivery_service.clone()));
            }
            for target in &doc.targets {
                if !services.contains_key(&target.delivery_service) {
                    tracing::warn!(steering = %doc.delivery_service, target = %target.delivery_service, "Steering target is not a known delivery service");
                }
            }
            steering.insert(doc.delivery_service.clone(), Arc::new(Steering::from_doc(doc)));
        }

        let register = Self {
            caches,
            locations,
            delivery_services: services.into_iter().map(|(id, ds)| (id, Arc::new(ds))).collect(),
            steering,
            http_matchers,
            dns_matchers,
        };

        tracing::info!(
            caches = register.caches.len(),
            locations = register.locations.len(),
            delivery_services = register.delivery_services.len(),
            steering = register.steering.len(),
            "Cache register built"
        );
        Ok(register)
    }

    // --- Lookups ---

    pub fn cache(&self, id: &str) -> Option<&Arc<Cache>> {
        self.caches.get(id)
    }

    pub fn caches(&self) -> impl Iterator<Item = &Arc<Cache>> {
        self.caches.values()
    }

    pub fn location(&self, id: &str) -> Option<&Arc<CacheLocation>> {
        self.locations.get(id)
    }

    pub fn locations(&self) -> impl Iterator<Item = &Arc<CacheLocation>> {
        self.locations.values()
    }

    pub fn delivery_service(&self, id: &str) -> Option<&Arc<DeliveryService>> {
        self.delivery_services.get(id)
    }

    pub fn delivery_services(&self) -> impl Iterator<Item = &Arc<DeliveryService>> {
        self.delivery_services.values()
    }

    pub fn steering(&self, ds_id: &str) -> Option<&Arc<Steering>> {
        self.steering.get(ds_id)
    }

    pub fn is_steering(&self, ds_id: &str) -> bool {
        self.steering.contains_key(ds_id)
    }

    /// The HTTP delivery service whose match set accepts `request`.
    pub fn match_http(&self, request: &HttpRequest) -> Option<&Arc<DeliveryService>> {
        find_match(&self.http_matchers, request).and_then(|id| self.delivery_services.get(id))
    }

    /// The DNS delivery service whose host pattern accepts `hostname`.
    pub fn match_dns(&self, hostname: &str) -> Option<&Arc<DeliveryService>> {
        let request = HttpRequest::new(IpAddr::from([0, 0, 0, 0]), hostname, "");
        find_match(&self.dns_matchers, &request).and_then(|id| self.delivery_services.get(id))
    }
}

fn find_match<'a>(matchers: &'a [ServiceMatcher], request: &HttpRequest) -> Option<&'a str> {
    matchers
        .iter()
        .find(|m| m.matches(request))
        .map(|m| m.delivery_service.as_str())
}

fn build_caches(snapshot: &Snapshot) -> SnapshotResult<BTreeMap<String, Arc<Cache>>> {
    let mut caches = BTreeMap::new();
    for (id, doc) in &snapshot.caches {
        if !snapshot.locations.contains_key(&doc.location_id) {
            return Err(SnapshotError::UnknownLocation {
                cache: id.clone(),
                location: doc.location_id.clone(),
            });
        }

        let mut cache = Cache::new(id.clone(), doc.location_id.clone())
            .with_ports(doc.port, doc.https_port)
            .with_hashing(
                doc.hash_id.as_deref().unwrap_or(id),
                doc.hash_count.unwrap_or(DEFAULT_HASH_COUNT),
            );
        if !doc.fqdn.is_empty() {
            cache = cache.with_fqdn(doc.fqdn.clone());
        }
        if let Some(ip) = doc.ip.as_deref().filter(|ip| !ip.is_empty()) {
            let addr = ip.parse().map_err(|_| SnapshotError::InvalidAddress {
                cache: id.clone(),
                address: ip.to_string(),
            })?;
            cache = cache.with_ip4(addr);
        }
        if let Some(ip6) = doc.ip6.as_deref().filter(|ip| !ip.is_empty()) {
            let bare = ip6.split('/').next().unwrap_or(ip6);
            let addr = bare.parse().map_err(|_| SnapshotError::InvalidAddress {
                cache: id.clone(),
                address: ip6.to_string(),
            })?;
            cache = cache.with_ip6(addr);
        }
        for (ds_id, fqdns) in &doc.delivery_services {
            cache = cache.with_delivery_service(ds_id.clone(), fqdns.first().map(|f| f.to_lowercase()));
        }
        caches.insert(id.clone(), Arc::new(cache));
    }
    Ok(caches)
}

fn build_locations(snapshot: &Snapshot, caches: &BTreeMap<String, Arc<Cache>>) -> BTreeMap<String, Arc<CacheLocation>> {
    let mut locations: BTreeMap<String, CacheLocation> = BTreeMap::new();
    for (id, doc) in &snapshot.locations {
        let methods = doc.localization_methods.iter().filter_map(|m| match m.parse::<LocalizationMethod>() {
            Ok(method) => Some(method),
            Err(e) => {
                tracing::warn!(location = %id, error = %e, "Ignoring localization method");
                None
            }
        });

        let mut location = CacheLocation::new(id.clone(), Geolocation::new(doc.latitude, doc.longitude)).with_methods(methods);

        if let Some(backups) = &doc.backup_locations {
            let list = backups
                .list
                .iter()
                .filter(|b| {
                    let known = snapshot.locations.contains_key(*b);
                    if !known {
                        tracing::warn!(location = %id, backup = %b, "Skipping unknown backup location");
                    }
                    known
                })
                .cloned()
                .collect();
            location = location.with_backups(list, backups.fallback_to_closest);
        }
        locations.insert(id.clone(), location);
    }

    for cache in caches.values() {
        if let Some(location) = locations.get_mut(&cache.location_id) {
            location.add_cache(Arc::clone(cache));
        }
    }

    locations.into_iter().map(|(id, loc)| (id, Arc::new(loc))).collect()
}

fn build_matchers(services: &BTreeMap<String, DeliveryServiceDoc>) -> SnapshotResult<(Vec<ServiceMatcher>, Vec<ServiceMatcher>)> {
    let mut http = Vec::new();
    let mut dns = Vec::new();

    for (ds_id, doc) in services {
        for (i, set) in doc.matchsets.iter().enumerate() {
            let mut conditions: Vec<Box<dyn Matcher>> = Vec::with_capacity(set.matchlist.len());
            for (j, entry) in set.matchlist.iter().enumerate() {
                let pattern_error = |source| SnapshotError::InvalidPattern {
                    ds: ds_id.clone(),
                    kind: entry.match_type.clone(),
                    pattern: entry.regex.clone(),
                    source,
                };
                let matcher: Box<dyn Matcher> = match entry.match_type.to_uppercase().as_str() {
                    "HOST" if i == 0 && j == 0 => Box::new(HostMatcher::with_bare_domain(&entry.regex).map_err(pattern_error)?),
                    "HOST" => Box::new(HostMatcher::new(&entry.regex).map_err(pattern_error)?),
                    "PATH" => Box::new(PathMatcher::new(&entry.regex).map_err(pattern_error)?),
                    "HEADER" => {
                        let name = entry.header_name.as_deref().unwrap_or_default();
                        Box::new(HeaderMatcher::new(name, &entry.regex).map_err(pattern_error)?)
                    }
                    other => {
                        return Err(SnapshotError::UnknownMatchType {
                            ds: ds_id.clone(),
                            kind: other.to_string(),
                        })
                    }
                };
                conditions.push(matcher);
            }

            let matcher = ServiceMatcher::new(ds_id.clone(), AndMatcher::new(conditions));
            if set.protocol.eq_ignore_ascii_case("DNS") {
                dns.push(matcher);
            } else {
                http.push(matcher);
            }
        }
    }

    sort_matchers(&mut http);
    sort_matchers(&mut dns);
    Ok((http, dns))
}

/// Classify a geo-limit redirect URL relative to the service that owns it.
fn geo_redirect_kind(ds_id: &str, url: &str, http_matchers: &[ServiceMatcher]) -> GeoRedirectKind {
    if !url.contains("://") {
        return GeoRedirectKind::DsUrl;
    }
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::error!(ds = %ds_id, url = %url, error = %e, "Invalid geo-limit redirect URL");
            return GeoRedirectKind::Invalid;
        }
    };
    let mut target = HttpRequest::new(IpAddr::from([0, 0, 0, 0]), parsed.host_str().unwrap_or_default(), parsed.path());
    if let Some(query) = parsed.query() {
        target = target.with_query(query);
    }
    match find_match(http_matchers, &target) {
        Some(owner) if owner == ds_id => GeoRedirectKind::DsUrl,
        _ => GeoRedirectKind::NotDsUrl,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> serde_json::Value {
        json!({
            "locations": {
                "loc-east": {"latitude": 40.0, "longitude": -75.0,
                              "backupLocations": {"list": ["loc-west", "loc-gone"]}},
                "loc-west": {"latitude": 37.0, "longitude": -122.0, "localizationMethods": ["GEO"]}
            },
            "caches": {
                "edge-01": {"locationId": "loc-east", "fqdn": "edge-01.cdn.test", "ip": "10.0.0.1",
                            "deliveryServices": {"ds-a": ["edge-01.ds-a.cdn.test"]}},
                "edge-02": {"locationId": "loc-west", "fqdn": "edge-02.cdn.test", "ip6": "2001:db8::2/64",
                            "deliveryServices": {"ds-a": []}}
            },
            "deliveryServices": {
                "ds-a": {
                    "matchsets": [{"protocol": "HTTP", "matchlist": [{"regex": ".*\\.ds-a\\..*", "match-type": "HOST"}]}],
                    "geoLimitRedirectURL": "http://tr.ds-a.cdn.test/blocked.html"
                },
                "ds-b": {
                    "matchsets": [{"protocol": "HTTP", "matchlist": [{"regex": ".*\\.ds-b\\..*", "match-type": "HOST"}]}],
                    "geoLimitRedirectURL": "http://tr.ds-a.cdn.test/blocked.html"
                },
                "ds-dns": {
                    "matchsets": [{"protocol": "DNS", "matchlist": [{"regex": ".*\\.ds-dns\\..*", "match-type": "HOST"}]}]
                }
            },
            "steering": [{"deliveryService": "ds-a", "targets": [{"deliveryService": "ds-b", "weight": 1}]}]
        })
    }

    fn build(value: serde_json::Value) -> SnapshotResult<CacheRegister> {
        CacheRegister::from_json(&value.to_string())
    }

    #[test]
    fn test_builds_entities() {
        let register = build(snapshot()).unwrap();
        let east = register.location("loc-east").unwrap();
        assert_eq!(east.caches().len(), 1);
        assert_eq!(east.backups(), ["loc-west".to_string()]);
        assert!(!east.fallback_to_closest());
        assert!(register.location("loc-west").unwrap().fallback_to_closest());

        let edge2 = register.cache("edge-02").unwrap();
        assert!(edge2.ip6.is_some());
        assert_eq!(edge2.fqdn_for("ds-a"), None);
        assert_eq!(register.cache("edge-01").unwrap().fqdn_for("ds-a"), Some("edge-01.ds-a.cdn.test"));
        assert!(register.is_steering("ds-a"));
    }

    #[test]
    fn test_http_and_dns_matching_are_separate() {
        let register = build(snapshot()).unwrap();
        let req = HttpRequest::new("10.0.0.9".parse().unwrap(), "tr.ds-a.cdn.test", "/x");
        assert_eq!(register.match_http(&req).unwrap().id, "ds-a");
        assert_eq!(register.match_http(&HttpRequest::new("10.0.0.9".parse().unwrap(), "ds-a.cdn.test", "/x")).unwrap().id, "ds-a");
        assert!(register.match_dns("tr.ds-a.cdn.test").is_none());
        assert_eq!(register.match_dns("edge.ds-dns.cdn.test").unwrap().id, "ds-dns");
    }

    #[test]
    fn test_geo_redirect_kind() {
        let register = build(snapshot()).unwrap();
        assert_eq!(register.delivery_service("ds-a").unwrap().geo_redirect_kind(), GeoRedirectKind::DsUrl);
        assert_eq!(register.delivery_service("ds-b").unwrap().geo_redirect_kind(), GeoRedirectKind::NotDsUrl);
    }

    #[test]
    fn test_rejects_unknown_cache_location() {
        let mut doc = snapshot();
        doc["caches"]["edge-01"]["locationId"] = json!("nowhere");
        assert!(matches!(build(doc), Err(SnapshotError::UnknownLocation { .. })));
    }

    #[test]
    fn test_rejects_bad_address() {
        let mut doc = snapshot();
        doc["caches"]["edge-01"]["ip"] = json!("10.0.0");
        assert!(matches!(build(doc), Err(SnapshotError::InvalidAddress { .. })));
    }

    #[test]
    fn test_rejects_bad_pattern() {
        let mut doc = snapshot();
        doc["deliveryServices"]["ds-a"]["matchsets"][0]["matchlist"][0]["regex"] = json!("(");
        assert!(matches!(build(doc), Err(SnapshotError::InvalidPattern { .. })));
    }
}
