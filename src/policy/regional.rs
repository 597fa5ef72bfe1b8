//! Regional geo blocking: per-service URL rules keyed on postal prefix or
//! coordinates.
//!
//! # Responsibilities
//! - Match the requested URL against a service's rules (first match wins)
//! - Allow allowlisted client networks outright
//! - Judge the client by postal prefix, or by coordinates when no postal
//!   code is known
//! - Turn a refusal into a redirect, an alternate path or a 520
//!
//! # Design Decisions
//! - An absolute alternate URL that its own rule would match is rejected at
//!   load time (redirect loop)
//! - Steering services only accept absolute alternate URLs

use std::collections::{BTreeMap, BTreeSet};

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::locate::cidr::{Cidr, CidrError, CidrTable};
use crate::policy::{PolicyDecision, PolicyError, RegionalGeoPolicy, REGIONAL_DENIED_CODE};
use crate::routing::request::HttpRequest;
use crate::topology::Geolocation;

/// Leading characters of a postal code that rules match on.
const POSTAL_PREFIX_LEN: usize = 3;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RulesDoc {
    delivery_services: Vec<RuleDoc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RuleDoc {
    delivery_service_id: String,
    url_regex: String,
    redirect_url: String,
    geo_location: GeoLocationDoc,
    ip_white_list: Vec<String>,
    #[serde(rename = "isSteeringDS")]
    is_steering_ds: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GeoLocationDoc {
    include_postal_code: Option<Vec<String>>,
    exclude_postal_code: Option<Vec<String>>,
    coordinate_range: Vec<CoordinateRange>,
}

/// A latitude/longitude box, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinateRange {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl CoordinateRange {
    fn is_valid(&self) -> bool {
        [self.min_lat, self.max_lat].iter().all(|l| (-90.0..=90.0).contains(l))
            && [self.min_lon, self.max_lon].iter().all(|l| (-180.0..=180.0).contains(l))
    }

    fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostalMode {
    Include,
    Exclude,
}

#[derive(Debug)]
struct Rule {
    url: Regex,
    mode: PostalMode,
    postals: BTreeSet<String>,
    ranges: Vec<CoordinateRange>,
    allowlist: CidrTable<()>,
    alternate_url: String,
}

impl Rule {
    fn allows_postal(&self, postal: &str) -> bool {
        let listed = self.postals.contains(postal);
        match self.mode {
            PostalMode::Include => listed,
            PostalMode::Exclude => !listed,
        }
    }

    fn allows_coordinates(&self, lat: f64, lon: f64) -> bool {
        let inside = self.ranges.iter().any(|r| r.contains(lat, lon));
        match self.mode {
            PostalMode::Include => inside,
            PostalMode::Exclude => !inside,
        }
    }
}

fn is_absolute(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Regional geo rules for every service that enables them.
#[derive(Debug, Default)]
pub struct RegionalGeoRules {
    services: BTreeMap<String, Vec<Rule>>,
}

impl RegionalGeoRules {
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        let doc: RulesDoc = serde_json::from_str(json)?;
        let mut rules = Self::default();
        for rule in doc.delivery_services {
            let ds = rule.delivery_service_id.trim().to_string();
            let invalid = |reason: &str| PolicyError::InvalidRule {
                ds: ds.clone(),
                reason: reason.to_string(),
            };
            if ds.is_empty() {
                return Err(invalid("deliveryServiceId empty"));
            }
            if rule.url_regex.trim().is_empty() {
                return Err(invalid("urlRegex empty"));
            }
            if rule.redirect_url.trim().is_empty() {
                return Err(invalid("redirectUrl empty"));
            }

            let (mode, postals) = match (rule.geo_location.include_postal_code, rule.geo_location.exclude_postal_code) {
                (Some(include), _) => (PostalMode::Include, include),
                (None, Some(exclude)) => (PostalMode::Exclude, exclude),
                (None, None) => return Err(invalid("geoLocation has neither includePostalCode nor excludePostalCode")),
            };

            let url = RegexBuilder::new(&format!("^(?:{})$", rule.url_regex))
                .case_insensitive(true)
                .build()
                .map_err(|e| invalid(&e.to_string()))?;

            let absolute = is_absolute(&rule.redirect_url);
            if absolute && url.is_match(&rule.redirect_url) {
                return Err(invalid("alternate URL matches its own rule (redirect loop)"));
            }
            if rule.is_steering_ds && !absolute {
                return Err(invalid("steering services need an absolute alternate URL"));
            }

            let ranges = rule
                .geo_location
                .coordinate_range
                .into_iter()
                .filter(|r| {
                    let valid = r.is_valid();
                    if !valid {
                        tracing::error!(ds = %ds, range = ?r, "Dropping out-of-bounds coordinate range");
                    }
                    valid
                })
                .collect();

            let mut allowlist = CidrTable::new();
            for network in &rule.ip_white_list {
                let cidr: Cidr = network.parse().map_err(|e: CidrError| invalid(&e.to_string()))?;
                allowlist.insert(cidr, ());
            }

            rules.services.entry(ds.clone()).or_default().push(Rule {
                url,
                mode,
                postals: postals.into_iter().collect(),
                ranges,
                allowlist,
                alternate_url: rule.redirect_url,
            });
        }
        tracing::info!(services = rules.services.len(), "Regional geo rules loaded");
        Ok(rules)
    }

    fn match_rule(&self, ds_id: &str, url: &str) -> Option<&Rule> {
        self.services.get(ds_id)?.iter().find(|r| r.url.is_match(url))
    }
}

impl RegionalGeoPolicy for RegionalGeoRules {
    fn enforce(&self, ds_id: &str, request: &HttpRequest, client: Option<&Geolocation>) -> PolicyDecision {
        let url = request.requested_url();
        let Some(rule) = self.match_rule(ds_id, &url) else {
            tracing::debug!(ds = %ds_id, url = %url, "No regional geo rule matched");
            return PolicyDecision::Block {
                status: REGIONAL_DENIED_CODE,
            };
        };

        let allowed = if rule.allowlist.lookup(request.client_ip).is_some() {
            true
        } else {
            let postal = client
                .and_then(|c| c.postal_code.as_deref())
                .filter(|p| !p.is_empty())
                .map(|p| p.chars().take(POSTAL_PREFIX_LEN).collect::<String>());
            match postal {
                Some(prefix) => rule.allows_postal(&prefix),
                None => {
                    let (lat, lon) = client.map_or((0.0, 0.0), |c| (c.latitude, c.longitude));
                    rule.allows_coordinates(lat, lon)
                }
            }
        };

        if allowed {
            PolicyDecision::Allow
        } else if is_absolute(&rule.alternate_url) {
            PolicyDecision::Redirect {
                url: rule.alternate_url.clone(),
            }
        } else if rule.alternate_url.starts_with('/') {
            PolicyDecision::AlternatePath {
                path: rule.alternate_url.clone(),
            }
        } else {
            PolicyDecision::AlternatePath {
                path: format!("/{}", rule.alternate_url),
            }
        }
    }
}
