//! Health feed application.
//!
//! # States
//! - Unknown: no report yet; the cache has no authority and stays usable
//! - Available / Unavailable: per cache, with per-family flags
//!
//! # Feed Document
//! ```text
//! {
//!   "caches":           { "<cache>": { "isAvailable", "ipv4Available", "ipv6Available" } },
//!   "deliveryServices": { "<ds>":    { "isAvailable", "disabledLocations": [...] } }
//! }
//! ```
//!
//! # Design Decisions
//! - Flags are atomics on the live entities, so a feed applies in place
//!   without rebuilding the router
//! - Entries for unknown caches or services are counted and ignored
//! - Caches missing from a feed keep their last reported state

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::topology::CacheRegister;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthFeed {
    pub caches: BTreeMap<String, CacheHealth>,
    pub delivery_services: BTreeMap<String, ServiceHealth>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheHealth {
    pub is_available: bool,
    #[serde(default)]
    pub ipv4_available: Option<bool>,
    #[serde(default)]
    pub ipv6_available: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceHealth {
    pub is_available: bool,
    pub disabled_locations: BTreeSet<String>,
}

impl Default for ServiceHealth {
    fn default() -> Self {
        Self {
            is_available: true,
            disabled_locations: BTreeSet::new(),
        }
    }
}

/// Counts from one feed application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub caches_updated: usize,
    pub caches_unavailable: usize,
    pub services_updated: usize,
    pub unknown_entries: usize,
}

impl HealthFeed {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Apply every report to the entities of `register`.
    pub fn apply(&self, register: &CacheRegister) -> HealthSummary {
        let mut summary = HealthSummary::default();

        for (id, health) in &self.caches {
            let Some(cache) = register.cache(id) else {
                tracing::debug!(cache = %id, "Health report for unknown cache");
                summary.unknown_entries += 1;
                continue;
            };
            let previous = cache.availability();
            cache.set_state(health.is_available, health.ipv4_available, health.ipv6_available);
            if previous != cache.availability() {
                tracing::info!(cache = %id, available = health.is_available, "Cache availability changed");
            }
            summary.caches_updated += 1;
            if !health.is_available {
                summary.caches_unavailable += 1;
            }
        }

        for (id, health) in &self.delivery_services {
            let Some(ds) = register.delivery_service(id) else {
                tracing::debug!(ds = %id, "Health report for unknown delivery service");
                summary.unknown_entries += 1;
                continue;
            };
            if ds.is_available() != health.is_available {
                tracing::info!(ds = %id, available = health.is_available, "Delivery service availability changed");
            }
            ds.set_state(health.is_available, health.disabled_locations.clone());
            summary.services_updated += 1;
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{Availability, IpVersion};
    use serde_json::json;

    fn register() -> CacheRegister {
        let doc = json!({
            "locations": {"loc-1": {"latitude": 1.0, "longitude": 1.0}},
            "caches": {
                "edge-01": {"locationId": "loc-1", "fqdn": "edge-01.cdn.test", "deliveryServices": {"ds-a": []}},
                "edge-02": {"locationId": "loc-1", "fqdn": "edge-02.cdn.test", "deliveryServices": {"ds-a": []}}
            },
            "deliveryServices": {"ds-a": {}}
        });
        CacheRegister::from_json(&doc.to_string()).unwrap()
    }

    #[test]
    fn test_apply_sets_flags() {
        let register = register();
        let feed = HealthFeed::from_json(
            &json!({
                "caches": {
                    "edge-01": {"isAvailable": false},
                    "edge-02": {"isAvailable": true, "ipv6Available": false},
                    "edge-99": {"isAvailable": true}
                },
                "deliveryServices": {"ds-a": {"disabledLocations": ["loc-1"]}}
            })
            .to_string(),
        )
        .unwrap();

        let summary = feed.apply(&register);
        assert_eq!(
            summary,
            HealthSummary {
                caches_updated: 2,
                caches_unavailable: 1,
                services_updated: 1,
                unknown_entries: 1,
            }
        );

        assert_eq!(register.cache("edge-01").unwrap().availability(), Availability::Unavailable);
        let edge2 = register.cache("edge-02").unwrap();
        assert!(edge2.is_available(IpVersion::V4));
        assert!(!edge2.is_available(IpVersion::V6));

        let ds = register.delivery_service("ds-a").unwrap();
        assert!(ds.is_available());
        assert!(!ds.is_location_available(register.location("loc-1").unwrap()));
    }

    #[test]
    fn test_missing_service_availability_defaults_true() {
        let health: ServiceHealth = serde_json::from_str("{}").unwrap();
        assert!(health.is_available);
    }
}
