//! Cache locations (cache groups).

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::topology::cache::Cache;
use crate::topology::geo::{Geolocation, Locatable};

/// How a client may be mapped onto a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocalizationMethod {
    Cz,
    DeepCz,
    Geo,
}

impl FromStr for LocalizationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CZ" => Ok(Self::Cz),
            "DEEP_CZ" => Ok(Self::DeepCz),
            "GEO" => Ok(Self::Geo),
            other => Err(format!("unknown localization method '{other}'")),
        }
    }
}

/// A physical site holding caches.
#[derive(Debug, Clone)]
pub struct CacheLocation {
    pub id: String,
    pub geolocation: Geolocation,
    caches: Vec<Arc<Cache>>,
    /// Backup location ids, tried in order when this one has no usable cache.
    backups: Vec<String>,
    /// May the closest-location search run after every backup failed.
    fallback_to_closest: bool,
    enabled_methods: BTreeSet<LocalizationMethod>,
}

impl CacheLocation {
    pub fn new(id: impl Into<String>, geolocation: Geolocation) -> Self {
        Self {
            id: id.into(),
            geolocation,
            caches: Vec::new(),
            backups: Vec::new(),
            fallback_to_closest: true,
            enabled_methods: BTreeSet::new(),
        }
    }

    pub fn with_backups(mut self, backups: Vec<String>, fallback_to_closest: bool) -> Self {
        self.backups = backups;
        self.fallback_to_closest = fallback_to_closest;
        self
    }

    /// Restrict the location to `methods`. An empty set enables every method.
    pub fn with_methods(mut self, methods: impl IntoIterator<Item = LocalizationMethod>) -> Self {
        self.enabled_methods = methods.into_iter().collect();
        self
    }

    pub fn with_caches(mut self, caches: Vec<Arc<Cache>>) -> Self {
        self.caches = caches;
        self
    }

    pub fn add_cache(&mut self, cache: Arc<Cache>) {
        self.caches.push(cache);
    }

    pub fn caches(&self) -> &[Arc<Cache>] {
        &self.caches
    }

    pub fn backups(&self) -> &[String] {
        &self.backups
    }

    pub fn fallback_to_closest(&self) -> bool {
        self.fallback_to_closest
    }

    pub fn is_enabled_for(&self, method: LocalizationMethod) -> bool {
        self.enabled_methods.is_empty() || self.enabled_methods.contains(&method)
    }
}

impl Locatable for CacheLocation {
    fn geolocation(&self) -> &Geolocation {
        &self.geolocation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_methods_enable_all() {
        let loc = CacheLocation::new("loc-1", Geolocation::new(0.0, 0.0));
        assert!(loc.is_enabled_for(LocalizationMethod::Cz));
        assert!(loc.is_enabled_for(LocalizationMethod::DeepCz));
        assert!(loc.is_enabled_for(LocalizationMethod::Geo));
    }

    #[test]
    fn test_restricted_methods() {
        let loc = CacheLocation::new("loc-1", Geolocation::new(0.0, 0.0))
            .with_methods([LocalizationMethod::Geo]);
        assert!(!loc.is_enabled_for(LocalizationMethod::Cz));
        assert!(loc.is_enabled_for(LocalizationMethod::Geo));
    }

    #[test]
    fn test_parse_method() {
        assert_eq!("DEEP_CZ".parse::<LocalizationMethod>(), Ok(LocalizationMethod::DeepCz));
        assert!("ANYCAST".parse::<LocalizationMethod>().is_err());
    }
}
