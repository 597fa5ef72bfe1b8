//! Client geolocation.
//!
//! Lookups never fail the request: the router demotes every
//! [`GeolocationError`] to "unlocatable".

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::locate::cidr::{Cidr, CidrError, CidrTable};
use crate::topology::{Geolocation, SnapshotError, SnapshotResult};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeolocationError {
    #[error("no geolocation for {0}")]
    NotFound(IpAddr),

    #[error("invalid client address '{0}'")]
    InvalidAddress(String),

    #[error("geolocation provider failure: {0}")]
    Provider(String),
}

pub trait GeolocationService: Send + Sync + std::fmt::Debug {
    fn locate(&self, ip: IpAddr) -> Result<Geolocation, GeolocationError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StaticEntryDoc {
    network: String,
    #[serde(flatten)]
    location: Geolocation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StaticGeolocationDoc {
    networks: Vec<StaticEntryDoc>,
}

/// Fixed network → location table, for labs and tests.
#[derive(Debug, Default)]
pub struct StaticGeolocation {
    table: CidrTable<Geolocation>,
}

impl StaticGeolocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `{"networks": [{"network": "10.0.0.0/8", "latitude": .., "longitude": .., "countryCode": ..}]}`.
    pub fn from_json(json: &str) -> SnapshotResult<Self> {
        let doc: StaticGeolocationDoc = serde_json::from_str(json)?;
        let mut geo = Self::new();
        for entry in doc.networks {
            let cidr: Cidr = entry.network.parse().map_err(|e: CidrError| SnapshotError::InvalidNetwork {
                owner: "static geolocation".to_string(),
                network: entry.network.clone(),
                reason: e.to_string(),
            })?;
            geo.insert(cidr, entry.location);
        }
        Ok(geo)
    }

    pub fn insert(&mut self, network: Cidr, location: Geolocation) {
        self.table.insert(network, location);
    }

    pub fn with(mut self, network: &str, location: Geolocation) -> Result<Self, CidrError> {
        self.insert(network.parse()?, location);
        Ok(self)
    }
}

impl GeolocationService for StaticGeolocation {
    fn locate(&self, ip: IpAddr) -> Result<Geolocation, GeolocationError> {
        self.table.lookup(ip).cloned().ok_or(GeolocationError::NotFound(ip))
    }
}

/// The default geolocation service plus named alternatives that a
/// delivery service may select.
#[derive(Debug, Clone)]
pub struct GeolocationProviders {
    default: Arc<dyn GeolocationService>,
    named: BTreeMap<String, Arc<dyn GeolocationService>>,
}

impl GeolocationProviders {
    pub fn new(default: Arc<dyn GeolocationService>) -> Self {
        Self {
            default,
            named: BTreeMap::new(),
        }
    }

    pub fn with_provider(mut self, name: impl Into<String>, service: Arc<dyn GeolocationService>) -> Self {
        self.named.insert(name.into(), service);
        self
    }

    /// The service named `provider`, or the default. Unknown names log and
    /// use the default.
    pub fn get(&self, provider: Option<&str>) -> &dyn GeolocationService {
        match provider {
            None => self.default.as_ref(),
            Some(name) => match self.named.get(name) {
                Some(service) => service.as_ref(),
                None => {
                    tracing::warn!(provider = %name, "Unknown geolocation provider, using default");
                    self.default.as_ref()
                }
            },
        }
    }
}

impl Default for GeolocationProviders {
    fn default() -> Self {
        Self::new(Arc::new(StaticGeolocation::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_lookup() {
        let geo = StaticGeolocation::from_json(
            r#"{"networks": [{"network": "192.0.2.0/24", "latitude": 51.5, "longitude": -0.1, "countryCode": "GB", "postalCode": "SW1A"}]}"#,
        )
        .unwrap();

        let hit = geo.locate("192.0.2.10".parse().unwrap()).unwrap();
        assert_eq!(hit.country_code.as_deref(), Some("GB"));
        assert_eq!(hit.postal_code.as_deref(), Some("SW1A"));

        let miss: IpAddr = "198.51.100.1".parse().unwrap();
        assert_eq!(geo.locate(miss), Err(GeolocationError::NotFound(miss)));
    }

    #[test]
    fn test_provider_selection() {
        let primary = StaticGeolocation::new().with("10.0.0.0/8", Geolocation::new(1.0, 1.0)).unwrap();
        let alternate = StaticGeolocation::new().with("10.0.0.0/8", Geolocation::new(2.0, 2.0)).unwrap();
        let providers = GeolocationProviders::new(Arc::new(primary)).with_provider("alt", Arc::new(alternate));
        let ip = "10.0.0.1".parse().unwrap();

        assert_eq!(providers.get(None).locate(ip).unwrap().latitude, 1.0);
        assert_eq!(providers.get(Some("alt")).locate(ip).unwrap().latitude, 2.0);
        assert_eq!(providers.get(Some("missing")).locate(ip).unwrap().latitude, 1.0);
    }
}
