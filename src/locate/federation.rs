//! Federation: per-service client networks answered with a partner CNAME.
//!
//! Document shape:
//! ```text
//! {"response": [{"deliveryService": "ds-a", "mappings": [
//!     {"cname": "cdn.partner.test.", "ttl": 60,
//!      "resolve4": ["192.0.2.0/24"], "resolve6": ["2001:db8::/48"]}
//! ]}]}
//! ```

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::Deserialize;

use crate::locate::cidr::{Cidr, CidrError, CidrTable};
use crate::routing::result::InetRecord;
use crate::topology::{SnapshotError, SnapshotResult};

pub trait FederationRegistry: Send + Sync + std::fmt::Debug {
    /// Records for a federated client of `ds_id`, empty when not federated.
    fn find_addresses(&self, ds_id: &str, client_ip: IpAddr) -> Vec<InetRecord>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FederationDoc {
    response: Vec<FederationEntryDoc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FederationEntryDoc {
    delivery_service: String,
    mappings: Vec<MappingDoc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MappingDoc {
    cname: String,
    ttl: u32,
    resolve4: Vec<String>,
    resolve6: Vec<String>,
}

#[derive(Debug, Default)]
pub struct StaticFederationRegistry {
    services: BTreeMap<String, CidrTable<InetRecord>>,
}

impl StaticFederationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> SnapshotResult<Self> {
        let doc: FederationDoc = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for entry in doc.response {
            for mapping in entry.mappings {
                for network in mapping.resolve4.iter().chain(&mapping.resolve6) {
                    let cidr: Cidr = network.parse().map_err(|e: CidrError| SnapshotError::InvalidNetwork {
                        owner: entry.delivery_service.clone(),
                        network: network.clone(),
                        reason: e.to_string(),
                    })?;
                    registry.insert(&entry.delivery_service, cidr, InetRecord::alias(mapping.cname.clone(), mapping.ttl));
                }
            }
        }
        Ok(registry)
    }

    pub fn insert(&mut self, ds_id: &str, network: Cidr, record: InetRecord) {
        self.services.entry(ds_id.to_string()).or_default().insert(network, record);
    }
}

impl FederationRegistry for StaticFederationRegistry {
    fn find_addresses(&self, ds_id: &str, client_ip: IpAddr) -> Vec<InetRecord> {
        self.services
            .get(ds_id)
            .and_then(|table| table.lookup(client_ip))
            .map(|record| vec![record.clone()])
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_federated_client_gets_cname() {
        let registry = StaticFederationRegistry::from_json(
            r#"{"response": [{"deliveryService": "ds-a", "mappings": [
                {"cname": "cdn.partner.test.", "ttl": 45, "resolve4": ["192.0.2.0/24"], "resolve6": ["2001:db8::/48"]}
            ]}]}"#,
        )
        .unwrap();

        let records = registry.find_addresses("ds-a", "192.0.2.7".parse().unwrap());
        assert_eq!(records, vec![InetRecord::alias("cdn.partner.test.", 45)]);
        assert_eq!(registry.find_addresses("ds-a", "2001:db8::1".parse().unwrap()).len(), 1);
        assert!(registry.find_addresses("ds-a", "198.51.100.1".parse().unwrap()).is_empty());
        assert!(registry.find_addresses("ds-b", "192.0.2.7".parse().unwrap()).is_empty());
    }
}
