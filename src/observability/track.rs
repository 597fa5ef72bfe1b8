//! Per-request routing trace.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::topology::Geolocation;

/// Transport a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RouteType {
    Dns,
    Http,
}

impl RouteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dns => "DNS",
            Self::Http => "HTTP",
        }
    }
}

/// Routing category of a finished request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultType {
    Cz,
    DeepCz,
    Geo,
    GeoDs,
    GeoRedirect,
    Miss,
    DsMiss,
    Fed,
    StaticRoute,
    DsRedirect,
    Rgdeny,
    Rgalt,
    AnonBlock,
    Error,
}

impl ResultType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cz => "CZ",
            Self::DeepCz => "DEEP_CZ",
            Self::Geo => "GEO",
            Self::GeoDs => "GEO_DS",
            Self::GeoRedirect => "GEO_REDIRECT",
            Self::Miss => "MISS",
            Self::DsMiss => "DS_MISS",
            Self::Fed => "FED",
            Self::StaticRoute => "STATIC_ROUTE",
            Self::DsRedirect => "DS_REDIRECT",
            Self::Rgdeny => "RGDENY",
            Self::Rgalt => "RGALT",
            Self::AnonBlock => "ANON_BLOCK",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request ended in its category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultDetails {
    #[default]
    NoDetails,
    DsNotFound,
    DsTlsMismatch,
    DsNoBypass,
    DsBypass,
    DsCzOnly,
    DsCzBackupCg,
    DsClientGeoUnsupported,
    GeoNoCacheFound,
    RegionalGeoNoRule,
    RegionalGeoAlternateWithoutCache,
    RegionalGeoAlternateWithCache,
}

impl ResultDetails {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoDetails => "NO_DETAILS",
            Self::DsNotFound => "DS_NOT_FOUND",
            Self::DsTlsMismatch => "DS_TLS_MISMATCH",
            Self::DsNoBypass => "DS_NO_BYPASS",
            Self::DsBypass => "DS_BYPASS",
            Self::DsCzOnly => "DS_CZ_ONLY",
            Self::DsCzBackupCg => "DS_CZ_BACKUP_CG",
            Self::DsClientGeoUnsupported => "DS_CLIENT_GEO_UNSUPPORTED",
            Self::GeoNoCacheFound => "GEO_NO_CACHE_FOUND",
            Self::RegionalGeoNoRule => "REGIONAL_GEO_NO_RULE",
            Self::RegionalGeoAlternateWithoutCache => "REGIONAL_GEO_ALTERNATE_WITHOUT_CACHE",
            Self::RegionalGeoAlternateWithCache => "REGIONAL_GEO_ALTERNATE_WITH_CACHE",
        }
    }
}

impl fmt::Display for ResultDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable trace owned by one request, flushed into
/// [`crate::observability::stats::StatTracker`] when routing finishes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub route_type: RouteType,
    pub fqdn: String,
    pub result: ResultType,
    pub result_details: ResultDetails,
    pub client_geolocation: Option<Geolocation>,
    pub result_location: Option<Geolocation>,
    /// Client was located through the geolocation service (not the CZ index).
    pub client_geolocation_queried: bool,
    #[serde(skip)]
    started: Instant,
}

impl Track {
    pub fn new(route_type: RouteType, fqdn: impl Into<String>) -> Self {
        Self {
            route_type,
            fqdn: fqdn.into(),
            result: ResultType::Error,
            result_details: ResultDetails::NoDetails,
            client_geolocation: None,
            result_location: None,
            client_geolocation_queried: false,
            started: Instant::now(),
        }
    }

    pub fn set_result(&mut self, result: ResultType) {
        self.result = result;
    }

    pub fn set_details(&mut self, details: ResultDetails) {
        self.result_details = details;
    }

    /// Set category and details together.
    pub fn set(&mut self, result: ResultType, details: ResultDetails) {
        self.result = result;
        self.result_details = details;
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
