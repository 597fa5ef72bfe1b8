//! Exact-match client network index (coverage zone).
//!
//! Document shape:
//! ```text
//! {"coverageZones": {"<location>": {
//!     "network": ["10.0.0.0/8"], "network6": ["2001:db8::/32"],
//!     "coordinates": {"latitude": 40.0, "longitude": -75.0},
//!     "caches": ["edge-01"]            // deep coverage zone only
//! }}}
//! ```

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::Deserialize;

use crate::locate::cidr::{Cidr, CidrTable};
use crate::topology::{Geolocation, SnapshotError, SnapshotResult};

/// A client network's entry in the index.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkMatch {
    pub location_id: String,
    pub geolocation: Option<Geolocation>,
    /// Caches of the deep location, empty for the regular index.
    pub deep_cache_names: Vec<String>,
}

/// Exact network lookup consumed by the router.
pub trait NetworkIndex: Send + Sync + std::fmt::Debug {
    fn lookup(&self, ip: IpAddr) -> Option<&NetworkMatch>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CoverageZoneDoc {
    coverage_zones: BTreeMap<String, ZoneDoc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ZoneDoc {
    network: Vec<String>,
    network6: Vec<String>,
    coordinates: Option<CoordinatesDoc>,
    caches: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct CoordinatesDoc {
    latitude: f64,
    longitude: f64,
}

/// Longest-prefix coverage zone table.
#[derive(Debug, Default)]
pub struct CoverageZoneIndex {
    table: CidrTable<NetworkMatch>,
}

impl CoverageZoneIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> SnapshotResult<Self> {
        let doc: CoverageZoneDoc = serde_json::from_str(json)?;
        let mut index = Self::new();
        for (location_id, zone) in doc.coverage_zones {
            let entry = NetworkMatch {
                location_id: location_id.clone(),
                geolocation: zone.coordinates.map(|c| Geolocation::new(c.latitude, c.longitude)),
                deep_cache_names: zone.caches,
            };
            for network in zone.network.iter().chain(&zone.network6) {
                let cidr: Cidr = network.parse().map_err(|e: crate::locate::cidr::CidrError| SnapshotError::InvalidNetwork {
                    owner: location_id.clone(),
                    network: network.clone(),
                    reason: e.to_string(),
                })?;
                index.insert(cidr, entry.clone());
            }
        }
        tracing::info!(networks = index.table.len(), "Coverage zone index loaded");
        Ok(index)
    }

    pub fn insert(&mut self, network: Cidr, entry: NetworkMatch) {
        self.table.insert(network, entry);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl NetworkIndex for CoverageZoneIndex {
    fn lookup(&self, ip: IpAddr) -> Option<&NetworkMatch> {
        self.table.lookup(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CZF: &str = r#"{
        "coverageZones": {
            "loc-east": {
                "network": ["10.0.0.0/8"],
                "network6": ["2001:db8::/32"],
                "coordinates": {"latitude": 40.0, "longitude": -75.0}
            },
            "loc-east-deep": {
                "network": ["10.1.0.0/16"],
                "caches": ["edge-deep-01"]
            }
        }
    }"#;

    #[test]
    fn test_lookup() {
        let index = CoverageZoneIndex::from_json(CZF).unwrap();
        assert_eq!(index.len(), 3);

        let hit = index.lookup("10.200.0.1".parse().unwrap()).unwrap();
        assert_eq!(hit.location_id, "loc-east");
        assert_eq!(hit.geolocation, Some(Geolocation::new(40.0, -75.0)));

        let deep = index.lookup("10.1.0.1".parse().unwrap()).unwrap();
        assert_eq!(deep.deep_cache_names, vec!["edge-deep-01".to_string()]);

        assert_eq!(index.lookup("2001:db8::9".parse().unwrap()).unwrap().location_id, "loc-east");
        assert!(index.lookup("192.0.2.1".parse().unwrap()).is_none());
    }

    #[test]
    fn test_bad_network_rejected() {
        let err = CoverageZoneIndex::from_json(r#"{"coverageZones": {"x": {"network": ["nope"]}}}"#).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidNetwork { .. }));
    }
}
