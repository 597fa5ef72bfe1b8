//! Steering: routing a request for a parent service to one of its targets.
//!
//! # Data Flow
//! ```text
//! entry service (steering parent)
//!     → x-tc-steering-option header?  → that target, if it is one
//!     → bypass filter on the path?    → the filter's service
//!     → consistent hash over weighted targets
//!
//! client steering (multi-route):
//!     → every target in hash order
//!     → per-target cache cascade, preferring caches not yet chosen
//!     → sort by declared order, then proximity
//!     → one URL per surviving target
//! ```

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::observability::{ResultDetails, ResultType, Track};
use crate::policy::{PolicyDecision, REGIONAL_DENIED_CODE};
use crate::routing::hash_key::pattern_based_hash_string;
use crate::routing::request::HttpRequest;
use crate::routing::result::HttpRouteResult;
use crate::routing::router::TrafficRouter;
use crate::topology::{Cache, DeliveryService, Geolocation, SteeringTarget};

/// How [`TrafficRouter::resolve_target`] arrived at its service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TargetChoice {
    /// Not a steering parent.
    Entry,
    /// The `x-tc-steering-option` header named the target.
    Header,
    /// A path filter sent the request past the hash.
    Filter,
    /// Consistent hash over the weighted targets.
    Hash,
}

/// One target picked by a multi-route, with the cache chosen for it.
#[derive(Debug)]
struct SteeringPick<'a> {
    target: &'a SteeringTarget,
    delivery_service: Arc<DeliveryService>,
    cache: Option<Arc<Cache>>,
}

impl TrafficRouter {
    /// Resolve the service that actually serves `request`.
    ///
    /// A plain service resolves to itself. A steering parent resolves to a
    /// target chosen by header, by path filter, or by consistent hash.
    pub(crate) fn consistent_hash_delivery_service(
        &self,
        entry: Option<&Arc<DeliveryService>>,
        request: &HttpRequest,
        steering_option: Option<&str>,
    ) -> Option<Arc<DeliveryService>> {
        self.resolve_target(entry, request, steering_option).map(|(ds, _)| ds)
    }

    /// [`Self::consistent_hash_delivery_service`], also reporting how the
    /// service was chosen.
    pub(crate) fn resolve_target(
        &self,
        entry: Option<&Arc<DeliveryService>>,
        request: &HttpRequest,
        steering_option: Option<&str>,
    ) -> Option<(Arc<DeliveryService>, TargetChoice)> {
        let entry = entry?;
        let Some(steering) = self.register.steering(&entry.id) else {
            return Some((Arc::clone(entry), TargetChoice::Entry));
        };

        if let Some(option) = steering_option.filter(|o| !o.is_empty()) {
            if !steering.has_target(option) {
                tracing::debug!(steering = %entry.id, option = %option, "Steering option is not a target");
                return None;
            }
            let ds = self.register.delivery_service(option)?;
            return Some((Arc::clone(ds), TargetChoice::Header));
        }

        if let Some(bypass) = steering.bypass_destination(&request.path) {
            if let Some(ds) = self.register.delivery_service(bypass) {
                return Some((Arc::clone(ds), TargetChoice::Filter));
            }
        }

        let targets: Vec<&SteeringTarget> = steering
            .targets
            .iter()
            .filter(|t| self.register.delivery_service(&t.delivery_service).is_some())
            .collect();
        let key = entry.hash_key(request, None);
        let target = self.hasher.select_dispersed_one(&targets, &entry.dispersion, &key)?;
        let ds = self.register.delivery_service(&target.delivery_service)?;
        Some((Arc::clone(ds), TargetChoice::Hash))
    }

    /// Route a client-steering request to one URL per usable target.
    pub(crate) fn multi_route(&self, request: &HttpRequest, track: &mut Track) -> Option<HttpRouteResult> {
        let Some(entry) = self.register.match_http(request).cloned() else {
            track.set(ResultType::DsMiss, ResultDetails::DsNotFound);
            return None;
        };
        if entry.is_tls_mismatch(request) {
            track.set(ResultType::Error, ResultDetails::DsTlsMismatch);
            return None;
        }

        let mut picks = self.steering_picks(&entry, request, track)?;
        let mut result = HttpRouteResult::new(true);

        if entry.regional_geo_enabled {
            if let Some(policy) = &self.regional_geo {
                let client = self.client_geolocation(request.client_ip, &entry, track);
                match policy.enforce(&entry.id, request, client.as_ref()) {
                    PolicyDecision::Allow => {}
                    PolicyDecision::Redirect { url } => {
                        let url = match url::Url::parse(&url) {
                            Ok(url) => url,
                            Err(e) => {
                                tracing::warn!(ds = %entry.id, url = %url, error = %e, "Regional geo returned an invalid URL");
                                return None;
                            }
                        };
                        track.set(ResultType::Rgalt, ResultDetails::RegionalGeoAlternateWithoutCache);
                        result.add_delivery_service(entry.id.clone());
                        result.set_url(url);
                        return Some(result);
                    }
                    // An alternate path needs a cache, and no cache has been chosen yet.
                    PolicyDecision::Block { .. } | PolicyDecision::AlternatePath { .. } => {
                        track.set(ResultType::Rgdeny, ResultDetails::RegionalGeoNoRule);
                        result.add_delivery_service(entry.id.clone());
                        result.response_code = Some(REGIONAL_DENIED_CODE);
                        return Some(result);
                    }
                }
            }
        }

        // Targets share the parent's path hash and add their own query params.
        let steering_hash = match entry.hash_regex() {
            Some(regex) => pattern_based_hash_string(regex, &request.path),
            None => request.path.clone(),
        };

        let mut selected: BTreeSet<String> = BTreeSet::new();
        for pick in &mut picks {
            let ds = Arc::clone(&pick.delivery_service);
            let Some(mut caches) = self.select_http_caches(request, &ds, track, true) else {
                continue;
            };

            let fresh: Vec<Arc<Cache>> = caches.iter().filter(|c| !selected.contains(&c.id)).cloned().collect();
            if !fresh.is_empty() {
                caches = fresh;
            } else if track.result == ResultType::DeepCz {
                // Every deep cache is taken; widen to the regular cascade.
                if let Some(wider) = self.select_http_caches(request, &ds, track, false) {
                    let fresh: Vec<Arc<Cache>> = wider.iter().filter(|c| !selected.contains(&c.id)).cloned().collect();
                    caches = if fresh.is_empty() { wider } else { fresh };
                }
                track.set_result(ResultType::DeepCz);
            }

            let key = format!("{steering_hash}{}", ds.significant_query_params(request));
            if let Some(cache) = self.hasher.select_dispersed_one(&caches, &ds.dispersion, &key) {
                selected.insert(cache.id.clone());
                pick.cache = Some(Arc::clone(cache));
            }
        }
        picks.retain(|pick| pick.cache.is_some());

        let client = self.steering_client_location(request, &entry, track, &picks);
        sort_picks(&mut picks, client.as_ref());

        for pick in &picks {
            let Some(cache) = &pick.cache else {
                continue;
            };
            match pick.delivery_service.create_url(request, cache) {
                Ok(url) => {
                    result.add_url(url);
                    result.add_delivery_service(pick.delivery_service.id.clone());
                }
                Err(e) => {
                    tracing::warn!(ds = %pick.delivery_service.id, cache = %cache.id, error = %e, "Unable to build steering URL");
                }
            }
        }

        if result.urls.is_empty() {
            let url = self.http_failure(&entry, request, track)?;
            result.add_delivery_service(entry.id.clone());
            result.add_url(url);
        }
        Some(result)
    }

    /// Every usable target of `entry` in hash order.
    fn steering_picks<'a>(&'a self, entry: &DeliveryService, request: &HttpRequest, track: &mut Track) -> Option<Vec<SteeringPick<'a>>> {
        let steering = self.register.steering(&entry.id)?;
        let targets: Vec<&SteeringTarget> = steering
            .targets
            .iter()
            .filter(|t| self.register.delivery_service(&t.delivery_service).is_some())
            .collect();

        let key = entry.hash_key(request, None);
        let ranked = self.hasher.select_hashables(&targets, targets.len(), &key, false);
        if ranked.is_empty() {
            track.set(ResultType::DsMiss, ResultDetails::DsNotFound);
            return None;
        }

        let mut picks = Vec::with_capacity(ranked.len());
        for target in ranked {
            let target: &'a SteeringTarget = *target;
            let Some(ds) = self.register.delivery_service(&target.delivery_service) else {
                continue;
            };
            if ds.is_tls_mismatch(request) {
                track.set(ResultType::Error, ResultDetails::DsTlsMismatch);
                return None;
            }
            if !ds.is_available() {
                tracing::debug!(steering = %entry.id, target = %ds.id, "Skipping unavailable steering target");
                continue;
            }
            picks.push(SteeringPick {
                target,
                delivery_service: Arc::clone(ds),
                cache: None,
            });
        }

        if picks.is_empty() {
            None
        } else {
            Some(picks)
        }
    }

    /// Client position used to order geo-pinned targets.
    fn steering_client_location(
        &self,
        request: &HttpRequest,
        entry: &DeliveryService,
        track: &mut Track,
        picks: &[SteeringPick<'_>],
    ) -> Option<Geolocation> {
        if !picks.iter().any(|p| p.target.geolocation.is_some()) {
            return None;
        }
        if let Some(network) = self.coverage_zones.lookup(request.client_ip) {
            if let Some(geo) = &network.geolocation {
                return Some(geo.clone());
            }
        }
        let located = self.client_geolocation(request.client_ip, entry, track);
        entry.support_location(located)
    }
}

/// Stable sort by declared order, then by proximity: pinned targets
/// nearest-first ahead of unpinned ones.
fn sort_picks(picks: &mut [SteeringPick<'_>], client: Option<&Geolocation>) {
    picks.sort_by(|a, b| {
        a.target
            .order
            .cmp(&b.target.order)
            .then_with(|| compare_proximity(a.target, b.target, client))
    });
}

fn compare_proximity(a: &SteeringTarget, b: &SteeringTarget, client: Option<&Geolocation>) -> Ordering {
    let Some(client) = client else {
        return Ordering::Equal;
    };
    match (&a.geolocation, &b.geolocation) {
        (Some(ga), Some(gb)) => client
            .distance_to(ga)
            .total_cmp(&client.distance_to(gb))
            .then_with(|| a.geo_order.cmp(&b.geo_order)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
