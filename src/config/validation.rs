//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity of the snapshot (caches → locations,
//!   backups → locations, steering → delivery services)
//! - Validate value ranges (addresses parse, intervals > 0, dispersion > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: config → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - Snapshot problems the register tolerates (dangling backups, unknown
//!   steering targets) are still reported here so operators see them

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::RouterConfig;
use crate::topology::Snapshot;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// One semantic problem, located by a dotted path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate the router configuration file.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be greater than 0"));
    }

    if config.snapshot.path.trim().is_empty() {
        errors.push(ValidationError::new("snapshot.path", "must not be empty"));
    }
    if config.snapshot.health_path.is_some() && config.snapshot.health_poll_secs == 0 {
        errors.push(ValidationError::new("snapshot.health_poll_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled && config.observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }
    if !LOG_LEVELS.contains(&config.observability.log_level.to_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the references inside a topology snapshot.
pub fn validate_snapshot(snapshot: &Snapshot) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (id, cache) in &snapshot.caches {
        if !snapshot.locations.contains_key(&cache.location_id) {
            errors.push(ValidationError::new(
                format!("caches.{id}.locationId"),
                format!("unknown location '{}'", cache.location_id),
            ));
        }
    }

    for (id, location) in &snapshot.locations {
        let Some(backups) = &location.backup_locations else {
            continue;
        };
        for backup in &backups.list {
            if !snapshot.locations.contains_key(backup) {
                errors.push(ValidationError::new(
                    format!("locations.{id}.backupLocations"),
                    format!("unknown backup location '{backup}'"),
                ));
            }
        }
    }

    for (id, ds) in &snapshot.delivery_services {
        if ds.dispersion.limit == 0 {
            errors.push(ValidationError::new(format!("deliveryServices.{id}.dispersion.limit"), "must be greater than 0"));
        }
    }

    for steering in &snapshot.steering {
        if !snapshot.delivery_services.contains_key(&steering.delivery_service) {
            errors.push(ValidationError::new(
                "steering",
                format!("unknown delivery service '{}'", steering.delivery_service),
            ));
        }
        for target in &steering.targets {
            if !snapshot.delivery_services.contains_key(&target.delivery_service) {
                errors.push(ValidationError::new(
                    format!("steering.{}.targets", steering.delivery_service),
                    format!("unknown delivery service '{}'", target.delivery_service),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&RouterConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_config_error() {
        let mut config = RouterConfig::default();
        config.listener.bind_address = "nowhere".to_string();
        config.observability.log_level = "loud".to_string();
        config.snapshot.path = String::new();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["listener.bind_address", "snapshot.path", "observability.log_level"]);
    }

    #[test]
    fn test_snapshot_references() {
        let snapshot: Snapshot = serde_json::from_str(
            r#"{
                "locations": {"loc-1": {"backupLocations": {"list": ["loc-9"]}}},
                "caches": {"edge-01": {"locationId": "loc-2"}},
                "deliveryServices": {"ds-a": {"dispersion": {"limit": 0}}},
                "steering": [{"deliveryService": "ds-a", "targets": [{"deliveryService": "ds-x", "weight": 1}]}]
            }"#,
        )
        .unwrap();

        let errors = validate_snapshot(&snapshot).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.message.contains("loc-9")));
        assert!(errors.iter().any(|e| e.message.contains("ds-x")));
    }
}
