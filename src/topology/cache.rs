//! Edge cache abstraction.
//!
//! # Responsibilities
//! - Represent a single edge cache and the services it carries
//! - Hold the cache's replica points for consistent hashing
//! - Track availability reported by the health feed (Unknown/Available/Unavailable)

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use serde::Serialize;

use crate::hash::{Hashable, ReplicaSet};

/// Replica count used when the snapshot does not set one.
pub const DEFAULT_HASH_COUNT: usize = 1000;

/// Availability as last reported by the health feed.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// No report yet. The cache has no authority and is treated as usable.
    Unknown = 0,
    Available = 1,
    Unavailable = 2,
}

impl From<u8> for Availability {
    fn from(val: u8) -> Self {
        match val {
            1 => Availability::Available,
            2 => Availability::Unavailable,
            _ => Availability::Unknown,
        }
    }
}

/// Address family of the request being answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IpVersion {
    V4,
    V6,
}

/// A single edge cache.
#[derive(Debug)]
pub struct Cache {
    pub id: String,
    pub fqdn: String,
    pub location_id: String,
    pub ip4: Option<Ipv4Addr>,
    pub ip6: Option<Ipv6Addr>,
    pub port: u16,
    pub https_port: u16,
    /// Delivery service id → FQDN the cache answers to for that service.
    delivery_services: BTreeMap<String, Option<String>>,
    replicas: ReplicaSet,

    state: AtomicU8,
    ipv4_available: AtomicBool,
    ipv6_available: AtomicBool,
}

impl Cache {
    /// Create a cache with default ports and replica count.
    pub fn new(id: impl Into<String>, location_id: impl Into<String>) -> Self {
        let id = id.into();
        let replicas = ReplicaSet::generate(&id, DEFAULT_HASH_COUNT);
        Self {
            fqdn: id.clone(),
            id,
            location_id: location_id.into(),
            ip4: None,
            ip6: None,
            port: 80,
            https_port: 443,
            delivery_services: BTreeMap::new(),
            replicas,
            state: AtomicU8::new(Availability::Unknown as u8),
            ipv4_available: AtomicBool::new(true),
            ipv6_available: AtomicBool::new(true),
        }
    }

    pub fn with_fqdn(mut self, fqdn: impl Into<String>) -> Self {
        self.fqdn = fqdn.into();
        self
    }

    pub fn with_ip4(mut self, ip: Ipv4Addr) -> Self {
        self.ip4 = Some(ip);
        self
    }

    pub fn with_ip6(mut self, ip: Ipv6Addr) -> Self {
        self.ip6 = Some(ip);
        self
    }

    pub fn with_ports(mut self, port: u16, https_port: u16) -> Self {
        self.port = port;
        self.https_port = https_port;
        self
    }

    /// Regenerate replica points from `hash_id`.
    pub fn with_hashing(mut self, hash_id: &str, hash_count: usize) -> Self {
        self.replicas = ReplicaSet::generate(hash_id, hash_count.max(1));
        self
    }

    /// Assign a delivery service, optionally with a per-service FQDN.
    pub fn with_delivery_service(mut self, ds_id: impl Into<String>, fqdn: Option<String>) -> Self {
        self.delivery_services.insert(ds_id.into(), fqdn);
        self
    }

    pub fn has_delivery_service(&self, ds_id: &str) -> bool {
        self.delivery_services.contains_key(ds_id)
    }

    /// The per-service FQDN, if the snapshot assigned one.
    pub fn fqdn_for(&self, ds_id: &str) -> Option<&str> {
        self.delivery_services.get(ds_id).and_then(|f| f.as_deref())
    }

    pub fn delivery_service_ids(&self) -> impl Iterator<Item = &str> {
        self.delivery_services.keys().map(String::as_str)
    }

    // --- Health Logic ---

    pub fn availability(&self) -> Availability {
        Availability::from(self.state.load(Ordering::Relaxed))
    }

    /// True once the health feed has reported on this cache.
    pub fn has_authority(&self) -> bool {
        self.availability() != Availability::Unknown
    }

    /// True if the cache is reported available for the given address family.
    pub fn is_available(&self, version: IpVersion) -> bool {
        if self.availability() != Availability::Available {
            return false;
        }
        match version {
            IpVersion::V4 => self.ipv4_available.load(Ordering::Relaxed),
            IpVersion::V6 => self.ipv6_available.load(Ordering::Relaxed),
        }
    }

    /// Usable for routing: no authority yet, or available for `version`.
    pub fn is_usable(&self, version: IpVersion) -> bool {
        !self.has_authority() || self.is_available(version)
    }

    /// Apply a health report. Per-family flags default to the overall flag.
    pub fn set_state(&self, available: bool, ipv4: Option<bool>, ipv6: Option<bool>) {
        let state = if available {
            Availability::Available
        } else {
            Availability::Unavailable
        };
        self.state.store(state as u8, Ordering::Relaxed);
        self.ipv4_available
            .store(ipv4.unwrap_or(available), Ordering::Relaxed);
        self.ipv6_available
            .store(ipv6.unwrap_or(available), Ordering::Relaxed);
    }

    /// Drop any health report; the cache reverts to having no authority.
    pub fn clear_state(&self) {
        self.state.store(Availability::Unknown as u8, Ordering::Relaxed);
        self.ipv4_available.store(true, Ordering::Relaxed);
        self.ipv6_available.store(true, Ordering::Relaxed);
    }
}

impl Hashable for Cache {
    fn replicas(&self) -> &ReplicaSet {
        &self.replicas
    }
}

impl PartialEq for Cache {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Cache {}

impl std::hash::Hash for Cache {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_state_is_usable() {
        let cache = Cache::new("edge-01", "loc-1");
        assert_eq!(cache.availability(), Availability::Unknown);
        assert!(!cache.has_authority());
        assert!(cache.is_usable(IpVersion::V4));
        assert!(!cache.is_available(IpVersion::V4));
    }

    #[test]
    fn test_state_transitions() {
        let cache = Cache::new("edge-01", "loc-1");

        cache.set_state(false, None, None);
        assert!(cache.has_authority());
        assert!(!cache.is_usable(IpVersion::V4));

        cache.set_state(true, None, None);
        assert!(cache.is_usable(IpVersion::V4));
        assert!(cache.is_usable(IpVersion::V6));

        cache.clear_state();
        assert!(!cache.has_authority());
    }

    #[test]
    fn test_per_family_availability() {
        let cache = Cache::new("edge-01", "loc-1");
        cache.set_state(true, Some(true), Some(false));
        assert!(cache.is_usable(IpVersion::V4));
        assert!(!cache.is_usable(IpVersion::V6));
    }

    #[test]
    fn test_delivery_service_assignment() {
        let cache = Cache::new("edge-01", "loc-1")
            .with_delivery_service("ds-a", Some("edge-01.ds-a.cdn.test".into()))
            .with_delivery_service("ds-b", None);
        assert!(cache.has_delivery_service("ds-a"));
        assert!(!cache.has_delivery_service("ds-c"));
        assert_eq!(cache.fqdn_for("ds-a"), Some("edge-01.ds-a.cdn.test"));
        assert_eq!(cache.fqdn_for("ds-b"), None);
    }

    #[test]
    fn test_with_hashing_regenerates_replicas() {
        let cache = Cache::new("edge-01", "loc-1").with_hashing("edge-01", 10);
        assert_eq!(cache.replicas().len(), 10);
    }
}
