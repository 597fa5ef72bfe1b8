//! Wire format of the routing snapshot document.
//!
//! The snapshot is the JSON topology published by the control plane:
//! locations, caches, delivery services and steering assignments. These
//! types only describe the document; [`crate::topology::CacheRegister`]
//! turns them into live entities.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hash::Dispersion;

/// Root snapshot document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub locations: BTreeMap<String, LocationDoc>,
    pub caches: BTreeMap<String, CacheDoc>,
    pub delivery_services: BTreeMap<String, DeliveryServiceDoc>,
    pub steering: Vec<SteeringDoc>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationDoc {
    pub latitude: f64,
    pub longitude: f64,
    pub backup_locations: Option<BackupLocationsDoc>,
    /// `CZ`, `DEEP_CZ`, `GEO`. Empty enables all of them.
    pub localization_methods: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupLocationsDoc {
    pub list: Vec<String>,
    pub fallback_to_closest: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheDoc {
    pub location_id: String,
    pub fqdn: String,
    pub ip: Option<String>,
    pub ip6: Option<String>,
    pub port: u16,
    pub https_port: u16,
    /// Identity used for replica generation. Defaults to the cache id.
    pub hash_id: Option<String>,
    pub hash_count: Option<usize>,
    /// Delivery service id → FQDNs this cache answers to for that service.
    pub delivery_services: BTreeMap<String, Vec<String>>,
}

impl Default for CacheDoc {
    fn default() -> Self {
        Self {
            location_id: String::new(),
            fqdn: String::new(),
            ip: None,
            ip6: None,
            port: 80,
            https_port: 443,
            hash_id: None,
            hash_count: None,
            delivery_services: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliveryServiceDoc {
    pub routing_name: String,
    pub domains: Vec<String>,
    pub matchsets: Vec<MatchSetDoc>,
    pub coverage_zone_only: bool,
    /// Each entry is an AND of attribute equalities; entries are OR-ed.
    pub geo_enabled: Vec<BTreeMap<String, String>>,
    #[serde(rename = "geoLimitRedirectURL")]
    pub geo_limit_redirect_url: Option<String>,
    pub bypass_destination: Option<BypassDestinationDoc>,
    pub ttls: BTreeMap<String, u32>,
    pub miss_location: Option<MissLocationDoc>,
    pub dispersion: Dispersion,
    pub ip6_routing_enabled: bool,
    pub regional_geo_blocking: bool,
    pub anonymous_blocking_enabled: bool,
    pub geolocation_provider: Option<String>,
    pub ssl_enabled: bool,
    pub protocol: ProtocolDoc,
    pub deep_caching_type: String,
    pub consistent_hash_regex: Option<String>,
    pub consistent_hash_query_params: Vec<String>,
    pub append_query_string: bool,
    pub max_dns_ips_for_location: usize,
    pub location_failover_limit: usize,
}

impl Default for DeliveryServiceDoc {
    fn default() -> Self {
        Self {
            routing_name: "edge".to_string(),
            domains: Vec::new(),
            matchsets: Vec::new(),
            coverage_zone_only: false,
            geo_enabled: Vec::new(),
            geo_limit_redirect_url: None,
            bypass_destination: None,
            ttls: BTreeMap::new(),
            miss_location: None,
            dispersion: Dispersion::default(),
            ip6_routing_enabled: false,
            regional_geo_blocking: false,
            anonymous_blocking_enabled: false,
            geolocation_provider: None,
            ssl_enabled: false,
            protocol: ProtocolDoc::default(),
            deep_caching_type: "NEVER".to_string(),
            consistent_hash_regex: None,
            consistent_hash_query_params: Vec::new(),
            append_query_string: true,
            max_dns_ips_for_location: 0,
            location_failover_limit: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MatchSetDoc {
    /// `HTTP` or `DNS`.
    pub protocol: String,
    pub matchlist: Vec<MatchDoc>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MatchDoc {
    pub regex: String,
    /// `HOST`, `PATH` or `HEADER`.
    #[serde(rename = "match-type")]
    pub match_type: String,
    #[serde(rename = "header-name")]
    pub header_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BypassDestinationDoc {
    #[serde(rename = "HTTP", default)]
    pub http: Option<HttpBypassDoc>,
    #[serde(rename = "DNS", default)]
    pub dns: Option<DnsBypassDoc>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HttpBypassDoc {
    pub fqdn: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DnsBypassDoc {
    pub ip: Option<String>,
    pub ip6: Option<String>,
    pub cname: Option<String>,
    pub ttl: u32,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct MissLocationDoc {
    pub lat: f64,
    #[serde(rename = "long")]
    pub lon: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProtocolDoc {
    pub accept_http: bool,
    pub accept_https: bool,
    pub redirect_to_https: bool,
}

impl Default for ProtocolDoc {
    fn default() -> Self {
        Self {
            accept_http: true,
            accept_https: false,
            redirect_to_https: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SteeringDoc {
    pub delivery_service: String,
    pub client_steering: bool,
    pub targets: Vec<SteeringTargetDoc>,
    pub filters: Vec<SteeringFilterDoc>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SteeringTargetDoc {
    pub delivery_service: String,
    pub weight: u32,
    pub order: i32,
    pub geo_order: i32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SteeringFilterDoc {
    pub pattern: String,
    pub delivery_service: String,
}
