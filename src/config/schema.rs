//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the router.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::routing::RouterOptions;
use crate::topology::Geolocation;

/// Root configuration for the traffic router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Inspection API listener.
    pub listener: ListenerConfig,

    /// Locations of the topology documents.
    pub snapshot: SnapshotConfig,

    /// Router-wide routing switches.
    pub routing: RoutingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3333").
    pub bind_address: String,

    /// Per-request timeout for the inspection API, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3333".to_string(),
            request_timeout_secs: 10,
        }
    }
}

/// Paths of the documents a router is built from.
///
/// Only `path` is required. Every other document is optional and leaves its
/// collaborator empty when absent.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Topology snapshot (JSON).
    pub path: String,

    pub coverage_zone_path: Option<String>,

    pub deep_coverage_zone_path: Option<String>,

    pub federation_path: Option<String>,

    /// Default static geolocation table.
    pub geolocation_path: Option<String>,

    /// Named geolocation tables a delivery service may select.
    pub geolocation_providers: BTreeMap<String, String>,

    pub anonymous_ip_path: Option<String>,

    pub regional_geo_path: Option<String>,

    /// Health feed document, polled every `health_poll_secs`.
    pub health_path: Option<String>,

    pub health_poll_secs: u64,

    /// Rebuild the router when a topology document changes.
    pub watch: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: "snapshot.json".to_string(),
            coverage_zone_path: None,
            deep_coverage_zone_path: None,
            federation_path: None,
            geolocation_path: None,
            geolocation_providers: BTreeMap::new(),
            anonymous_ip_path: None,
            regional_geo_path: None,
            health_path: None,
            health_poll_secs: 5,
            watch: true,
        }
    }
}

impl SnapshotConfig {
    /// Every configured document path, for the watcher.
    pub fn watched_paths(&self) -> Vec<&str> {
        let mut paths = vec![self.path.as_str()];
        paths.extend(
            [
                &self.coverage_zone_path,
                &self.deep_coverage_zone_path,
                &self.federation_path,
                &self.geolocation_path,
                &self.anonymous_ip_path,
                &self.regional_geo_path,
            ]
            .into_iter()
            .flatten()
            .map(String::as_str),
        );
        paths.extend(self.geolocation_providers.values().map(String::as_str));
        paths
    }
}

/// Router-wide routing switches.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RoutingConfig {
    /// Hash DNS answers by hostname instead of shuffling.
    pub consistent_dns_routing: bool,

    /// Remove `fakeClientIpAddress` and `format` from redirect URLs.
    pub strip_special_query_params: bool,

    /// Country code → centroid for clients located only to a country.
    pub default_geolocation_overrides: BTreeMap<String, Geolocation>,

    pub anonymous_blocking_enabled: bool,
}

impl From<&RoutingConfig> for RouterOptions {
    fn from(config: &RoutingConfig) -> Self {
        RouterOptions {
            consistent_dns_routing: config.consistent_dns_routing,
            strip_special_query_params: config.strip_special_query_params,
            default_geolocation_overrides: config.default_geolocation_overrides.clone(),
            anonymous_blocking_enabled: config.anonymous_blocking_enabled,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
