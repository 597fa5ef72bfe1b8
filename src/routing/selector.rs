//! Cache selection for one delivery service.
//!
//! # Responsibilities
//! - Filter a location's caches down to those able to serve a service
//! - Resolve the client's coverage zone location (regular or deep)
//! - Walk backup locations and the closest-location search
//! - Fall back to geolocation and geo-limit redirects
//!
//! Every step records what it decided on the request's [`Track`]. None of
//! these functions return errors: exhausting a step yields `None` and the
//! caller moves on to the next one.

use std::net::IpAddr;
use std::sync::Arc;

use crate::locate::NetworkMatch;
use crate::observability::{ResultDetails, ResultType, Track};
use crate::routing::request::HttpRequest;
use crate::routing::router::TrafficRouter;
use crate::topology::{
    order_locations, Cache, CacheLocation, DeepCachingType, DeliveryService, GeoRedirectKind,
    Geolocation, IpVersion, LocalizationMethod,
};

/// Caches of `location` assigned to `ds` and usable for `version`.
///
/// Caches the health feed has not reported on yet are kept. Returns `None`
/// rather than an empty list so callers can chain fallbacks.
pub fn select_caches(location: &CacheLocation, ds: &DeliveryService, version: IpVersion) -> Option<Vec<Arc<Cache>>> {
    let caches: Vec<Arc<Cache>> = location
        .caches()
        .iter()
        .filter(|cache| cache.has_delivery_service(&ds.id) && cache.is_usable(version))
        .cloned()
        .collect();

    if caches.is_empty() {
        None
    } else {
        Some(caches)
    }
}

/// Outcome of a coverage zone lookup.
#[derive(Debug, Clone)]
pub(crate) struct ZoneLookup {
    pub location: Option<Arc<CacheLocation>>,
    /// The location is a backup or the closest substitute, not the match itself.
    pub from_backup: bool,
    /// Geolocation may still be tried if this lookup yields nothing.
    pub continue_geo: bool,
}

impl ZoneLookup {
    fn miss() -> Self {
        Self {
            location: None,
            from_backup: false,
            continue_geo: true,
        }
    }

    fn forbid_geo() -> Self {
        Self {
            continue_geo: false,
            ..Self::miss()
        }
    }

    fn found(location: Arc<CacheLocation>, from_backup: bool) -> Self {
        Self {
            location: Some(location),
            from_backup,
            continue_geo: true,
        }
    }
}

impl TrafficRouter {
    /// Geolocate `ip` with the service's provider. Failures are logged and
    /// treated as unlocatable.
    pub(crate) fn geolocate(&self, ip: IpAddr, ds: &DeliveryService) -> Option<Geolocation> {
        match self.geolocation.get(ds.geolocation_provider.as_deref()).locate(ip) {
            Ok(location) => Some(location),
            Err(e) => {
                tracing::warn!(client = %ip, ds = %ds.id, error = %e, "Failed looking up client geolocation");
                None
            }
        }
    }

    /// Geolocate once per request, caching the answer on the track.
    pub(crate) fn client_geolocation(&self, ip: IpAddr, ds: &DeliveryService, track: &mut Track) -> Option<Geolocation> {
        if track.client_geolocation_queried {
            return track.client_geolocation.clone();
        }
        let located = self.geolocate(ip, ds);
        track.client_geolocation = located.clone();
        track.client_geolocation_queried = true;
        located
    }

    // --- Coverage zone ---

    /// Resolve the coverage zone location for `ip`.
    ///
    /// The deep variant builds a location from the deep network entry's
    /// cache list. The regular variant walks the matched location, its
    /// backups and finally the closest CZ-enabled location.
    pub(crate) fn coverage_zone_location(&self, ip: IpAddr, ds: &DeliveryService, deep: bool, version: IpVersion) -> ZoneLookup {
        if deep {
            return match self.deep_coverage_zones.lookup(ip) {
                Some(network) => match self.deep_location(network) {
                    Some(location) if select_caches(&location, ds, version).is_some() => {
                        ZoneLookup::found(Arc::new(location), false)
                    }
                    _ => ZoneLookup::miss(),
                },
                None => ZoneLookup::miss(),
            };
        }

        let Some(network) = self.coverage_zones.lookup(ip) else {
            return ZoneLookup::miss();
        };

        let Some(location) = self.register.location(&network.location_id) else {
            tracing::debug!(client = %ip, location = %network.location_id, "Coverage zone names an unknown location");
            return self.closest_or_miss(ds, network, version);
        };

        if !location.is_enabled_for(LocalizationMethod::Cz) {
            return ZoneLookup::forbid_geo();
        }
        if select_caches(location, ds, version).is_some() {
            return ZoneLookup::found(Arc::clone(location), false);
        }

        for backup_id in location.backups() {
            let Some(backup) = self.register.location(backup_id) else {
                continue;
            };
            if !backup.is_enabled_for(LocalizationMethod::Cz) {
                tracing::debug!(location = %location.id, backup = %backup_id, "Backup location disabled for CZ");
                continue;
            }
            if select_caches(backup, ds, version).is_some() {
                tracing::debug!(location = %location.id, backup = %backup_id, "Using backup location");
                return ZoneLookup::found(Arc::clone(backup), true);
            }
        }

        if !location.fallback_to_closest() {
            return ZoneLookup::forbid_geo();
        }

        self.closest_or_miss(ds, network, version)
    }

    fn closest_or_miss(&self, ds: &DeliveryService, network: &NetworkMatch, version: IpVersion) -> ZoneLookup {
        self.closest_cz_location(ds, network, version)
            .map_or_else(ZoneLookup::miss, |location| ZoneLookup::found(location, true))
    }

    /// Nearest CZ-enabled location to the network's coordinates that has caches.
    fn closest_cz_location(&self, ds: &DeliveryService, network: &NetworkMatch, version: IpVersion) -> Option<Arc<CacheLocation>> {
        let origin = network.geolocation.as_ref()?;
        let mut candidates: Vec<Arc<CacheLocation>> = self
            .register
            .locations()
            .filter(|loc| loc.is_enabled_for(LocalizationMethod::Cz) && ds.is_location_available(loc))
            .cloned()
            .collect();
        order_locations(&mut candidates, origin);

        candidates
            .into_iter()
            .find(|loc| select_caches(loc, ds, version).is_some())
    }

    /// An ephemeral location holding the deep network entry's caches.
    fn deep_location(&self, network: &NetworkMatch) -> Option<CacheLocation> {
        let registered = self.register.location(&network.location_id);
        if registered.is_some_and(|loc| !loc.is_enabled_for(LocalizationMethod::DeepCz)) {
            return None;
        }

        let geolocation = network
            .geolocation
            .clone()
            .or_else(|| registered.map(|loc| loc.geolocation.clone()))
            .unwrap_or_else(|| Geolocation::new(0.0, 0.0));

        let caches: Vec<Arc<Cache>> = network
            .deep_cache_names
            .iter()
            .filter_map(|name| self.register.cache(name).cloned())
            .collect();
        if caches.is_empty() {
            return None;
        }

        Some(CacheLocation::new(network.location_id.clone(), geolocation).with_caches(caches))
    }

    /// Caches of a coverage zone lookup, recording `result` on success.
    pub(crate) fn select_caches_by_cz(
        &self,
        ds: &DeliveryService,
        lookup: &ZoneLookup,
        track: &mut Track,
        result: ResultType,
        version: IpVersion,
    ) -> Option<Vec<Arc<Cache>>> {
        let location = lookup.location.as_ref()?;
        if !ds.is_location_available(location) {
            return None;
        }
        let caches = select_caches(location, ds, version)?;

        track.set_result(result);
        if lookup.from_backup {
            track.set_details(ResultDetails::DsCzBackupCg);
        }
        track.result_location = Some(location.geolocation.clone());
        Some(caches)
    }

    // --- Geolocation ---

    /// Geolocation fallback.
    ///
    /// `cz_location` stands in for the client's position when the coverage
    /// zone matched but had nothing to offer.
    pub(crate) fn select_caches_by_geo(
        &self,
        ip: IpAddr,
        ds: &DeliveryService,
        cz_location: Option<&CacheLocation>,
        track: &mut Track,
        version: IpVersion,
    ) -> Option<Vec<Arc<Cache>>> {
        let client = match cz_location {
            Some(location) => Some(location.geolocation.clone()),
            None => {
                let located = self.client_geolocation(ip, ds, track);
                ds.support_location(located)
            }
        };

        let Some(mut client) = client else {
            if ds.geo_redirect_url.is_some() {
                tracing::debug!(ds = %ds.id, client = %ip, "Client blocked by geo limit, using redirect");
                let queried = track.client_geolocation.clone();
                return self.enforce_geo_redirect(track, ds, ip, queried, version);
            }
            track.set_details(ResultDetails::DsClientGeoUnsupported);
            return None;
        };

        track.set_result(ResultType::Geo);
        if client.default_location {
            let country = client.country_code.clone().unwrap_or_default();
            if let Some(centroid) = self.options.default_geolocation_overrides.get(&country) {
                match ds.valid_miss_location() {
                    Some(miss) => {
                        client = miss.clone();
                        track.set_result(ResultType::GeoDs);
                    }
                    None => client = centroid.clone(),
                }
            }
        }

        let caches = self.caches_by_geo(ds, &client, track, version);
        if caches.is_none() {
            track.set_details(ResultDetails::GeoNoCacheFound);
        }
        caches
    }

    /// Try GEO-enabled locations nearest-first until one yields caches or
    /// the service's location limit is reached.
    pub(crate) fn caches_by_geo(
        &self,
        ds: &DeliveryService,
        client: &Geolocation,
        track: &mut Track,
        version: IpVersion,
    ) -> Option<Vec<Arc<Cache>>> {
        let mut candidates: Vec<Arc<CacheLocation>> = self
            .register
            .locations()
            .filter(|loc| loc.is_enabled_for(LocalizationMethod::Geo) && ds.is_location_available(loc))
            .cloned()
            .collect();
        order_locations(&mut candidates, client);

        for (tested, location) in candidates.iter().enumerate() {
            if let Some(caches) = select_caches(location, ds, version) {
                if location.geolocation.is_zero() {
                    tracing::error!(location = %location.id, "Location has geolocation 0,0");
                }
                track.result_location = Some(location.geolocation.clone());
                return Some(caches);
            }
            tracing::debug!(ds = %ds.id, location = %location.id, "No usable caches at location");
            if ds.location_limit != 0 && tested + 1 >= ds.location_limit {
                break;
            }
        }
        None
    }

    /// Resolve a geo-limit redirect.
    ///
    /// Returns caches only for a redirect that the service serves itself;
    /// the caller then serves the redirect path from the chosen cache.
    pub(crate) fn enforce_geo_redirect(
        &self,
        track: &mut Track,
        ds: &DeliveryService,
        ip: IpAddr,
        queried: Option<Geolocation>,
        version: IpVersion,
    ) -> Option<Vec<Arc<Cache>>> {
        track.set_result(ResultType::GeoRedirect);

        match ds.geo_redirect_kind() {
            GeoRedirectKind::NotDsUrl => None,
            GeoRedirectKind::Invalid => {
                track.set(ResultType::Miss, ResultDetails::GeoNoCacheFound);
                None
            }
            GeoRedirectKind::DsUrl => {
                let client = queried
                    .or_else(|| self.geolocate(ip, ds))
                    .or_else(|| ds.miss_location.clone());
                let Some(client) = client else {
                    track.set(ResultType::Miss, ResultDetails::DsClientGeoUnsupported);
                    return None;
                };
                let caches = self.caches_by_geo(ds, &client, track, version);
                if caches.is_none() {
                    track.set(ResultType::Miss, ResultDetails::GeoNoCacheFound);
                }
                caches
            }
        }
    }

    // --- HTTP cascade ---

    /// Run the HTTP selection cascade for `ds`: deep CZ, CZ, CZ-only policy,
    /// then geolocation.
    pub(crate) fn select_http_caches(
        &self,
        request: &HttpRequest,
        ds: &DeliveryService,
        track: &mut Track,
        enable_deep: bool,
    ) -> Option<Vec<Arc<Cache>>> {
        let version = request.ip_version();

        if enable_deep && ds.deep_caching == DeepCachingType::Always {
            let deep = self.coverage_zone_location(request.client_ip, ds, true, version);
            if let Some(caches) = self.select_caches_by_cz(ds, &deep, track, ResultType::DeepCz, version) {
                return Some(caches);
            }
        }

        let lookup = self.coverage_zone_location(request.client_ip, ds, false, version);
        if let Some(caches) = self.select_caches_by_cz(ds, &lookup, track, ResultType::Cz, version) {
            return Some(caches);
        }

        if ds.coverage_zone_only {
            if ds.geo_redirect_url.is_some() {
                let queried = track.client_geolocation.clone();
                return self.enforce_geo_redirect(track, ds, request.client_ip, queried, version);
            }
            track.set(ResultType::Miss, ResultDetails::DsCzOnly);
            return None;
        }

        if lookup.continue_geo {
            return self.select_caches_by_geo(request.client_ip, ds, lookup.location.as_deref(), track, version);
        }
        None
    }
}
