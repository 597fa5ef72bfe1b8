//! Configuration and snapshot loading from disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::config::schema::{RouterConfig, RoutingConfig, SnapshotConfig};
use crate::config::validation::{validate_config, validate_snapshot, ValidationError};
use crate::locate::{
    CoverageZoneIndex, GeolocationProviders, StaticFederationRegistry, StaticGeolocation,
};
use crate::policy::{AnonymousIpList, PolicyError, RegionalGeoRules};
use crate::routing::{RouterOptions, TrafficRouter};
use crate::topology::{CacheRegister, Snapshot, SnapshotError};

/// Error type for configuration and snapshot loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Snapshot error in {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: SnapshotError,
    },

    #[error("Policy error in {path}: {source}")]
    Policy {
        path: PathBuf,
        #[source]
        source: PolicyError,
    },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<RouterConfig, ConfigError> {
    let content = read(path)?;
    let config: RouterConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse and reference-check the topology snapshot.
///
/// Problems the register tolerates are logged; the register build itself
/// rejects the rest.
pub fn load_register(path: &Path) -> Result<CacheRegister, ConfigError> {
    let content = read(path)?;
    let snapshot: Snapshot = serde_json::from_str(&content).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    if let Err(errors) = validate_snapshot(&snapshot) {
        for error in &errors {
            tracing::warn!(path = %path.display(), %error, "Snapshot validation");
        }
    }

    CacheRegister::from_snapshot(&snapshot).map_err(|source| ConfigError::Snapshot {
        path: path.to_path_buf(),
        source,
    })
}

fn load_with<T>(path: &str, parse: impl FnOnce(&str) -> Result<T, SnapshotError>) -> Result<T, ConfigError> {
    let path = Path::new(path);
    parse(&read(path)?).map_err(|source| ConfigError::Snapshot {
        path: path.to_path_buf(),
        source,
    })
}

fn load_policy<T>(path: &str, parse: impl FnOnce(&str) -> Result<T, PolicyError>) -> Result<T, ConfigError> {
    let path = Path::new(path);
    parse(&read(path)?).map_err(|source| ConfigError::Policy {
        path: path.to_path_buf(),
        source,
    })
}

/// Build a complete router from the documents named in `snapshot`.
pub fn load_router(snapshot: &SnapshotConfig, routing: &RoutingConfig) -> Result<TrafficRouter, ConfigError> {
    let register = load_register(Path::new(&snapshot.path))?;
    let mut router = TrafficRouter::new(Arc::new(register)).with_options(RouterOptions::from(routing));

    if let Some(path) = &snapshot.coverage_zone_path {
        router = router.with_coverage_zones(Arc::new(load_with(path, CoverageZoneIndex::from_json)?));
    }
    if let Some(path) = &snapshot.deep_coverage_zone_path {
        router = router.with_deep_coverage_zones(Arc::new(load_with(path, CoverageZoneIndex::from_json)?));
    }
    if let Some(path) = &snapshot.federation_path {
        router = router.with_federations(Arc::new(load_with(path, StaticFederationRegistry::from_json)?));
    }

    let default_geo = match &snapshot.geolocation_path {
        Some(path) => load_with(path, StaticGeolocation::from_json)?,
        None => StaticGeolocation::new(),
    };
    let mut providers = GeolocationProviders::new(Arc::new(default_geo));
    for (name, path) in &snapshot.geolocation_providers {
        providers = providers.with_provider(name.clone(), Arc::new(load_with(path, StaticGeolocation::from_json)?));
    }
    router = router.with_geolocation(providers);

    if let Some(path) = &snapshot.anonymous_ip_path {
        router = router.with_anonymous_ip(Arc::new(load_policy(path, AnonymousIpList::from_json)?));
    }
    if let Some(path) = &snapshot.regional_geo_path {
        router = router.with_regional_geo(Arc::new(load_policy(path, RegionalGeoRules::from_json)?));
    }

    Ok(router)
}

/// Load the config file and build its router.
pub fn load(path: &Path) -> Result<(RouterConfig, TrafficRouter), ConfigError> {
    let config = load_config(path)?;
    let router = load_router(&config.snapshot, &config.routing)?;
    Ok((config, router))
}
