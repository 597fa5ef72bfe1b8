//! Steering delivery services: an entry service that fans requests out to
//! weighted targets.

use regex::Regex;

use crate::hash::{Hashable, ReplicaSet};
use crate::topology::geo::Geolocation;
use crate::topology::snapshot::SteeringDoc;

/// Replica budget shared by all targets of one steering service.
const REPLICA_BUDGET: f64 = 100_000.0;

/// One weighted destination of a steering service.
#[derive(Debug, Clone)]
pub struct SteeringTarget {
    pub delivery_service: String,
    pub weight: u32,
    pub order: i32,
    pub geo_order: i32,
    pub geolocation: Option<Geolocation>,
    replicas: ReplicaSet,
}

impl SteeringTarget {
    /// Build a target whose replica count is its share of `total_weight`.
    pub fn new(delivery_service: impl Into<String>, weight: u32, total_weight: u64) -> Self {
        let delivery_service = delivery_service.into();
        let count = replica_count(weight, total_weight);
        Self {
            replicas: ReplicaSet::generate(&delivery_service, count),
            delivery_service,
            weight,
            order: 0,
            geo_order: 0,
            geolocation: None,
        }
    }

    pub fn with_order(mut self, order: i32, geo_order: i32) -> Self {
        self.order = order;
        self.geo_order = geo_order;
        self
    }

    pub fn with_geolocation(mut self, geolocation: Geolocation) -> Self {
        self.geolocation = Some(geolocation);
        self
    }
}

fn replica_count(weight: u32, total_weight: u64) -> usize {
    if total_weight == 0 {
        return 1;
    }
    let share = f64::from(weight) / total_weight as f64;
    ((share * REPLICA_BUDGET).round() as usize).max(1)
}

impl Hashable for SteeringTarget {
    fn replicas(&self) -> &ReplicaSet {
        &self.replicas
    }
}

/// Sends requests whose path matches `pattern` straight to one target.
#[derive(Debug, Clone)]
pub struct SteeringFilter {
    pattern: Regex,
    pub delivery_service: String,
}

impl SteeringFilter {
    pub fn new(pattern: &str, delivery_service: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(&format!("^(?:{pattern})$"))?,
            delivery_service: delivery_service.into(),
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }
}

#[derive(Debug, Clone)]
pub struct Steering {
    pub delivery_service: String,
    pub client_steering: bool,
    pub targets: Vec<SteeringTarget>,
    pub filters: Vec<SteeringFilter>,
}

impl Steering {
    /// Build from a snapshot entry. Filters with invalid patterns are dropped.
    pub fn from_doc(doc: &SteeringDoc) -> Self {
        let total_weight: u64 = doc.targets.iter().map(|t| u64::from(t.weight)).sum();
        let targets = doc
            .targets
            .iter()
            .map(|t| {
                let target = SteeringTarget::new(t.delivery_service.clone(), t.weight, total_weight)
                    .with_order(t.order, t.geo_order);
                match (t.latitude, t.longitude) {
                    (Some(lat), Some(lon)) => target.with_geolocation(Geolocation::new(lat, lon)),
                    _ => target,
                }
            })
            .collect();

        let filters = doc
            .filters
            .iter()
            .filter_map(|f| match SteeringFilter::new(&f.pattern, f.delivery_service.clone()) {
                Ok(filter) => Some(filter),
                Err(e) => {
                    tracing::warn!(steering = %doc.delivery_service, pattern = %f.pattern, error = %e, "Dropping steering filter");
                    None
                }
            })
            .collect();

        Self {
            delivery_service: doc.delivery_service.clone(),
            client_steering: doc.client_steering,
            targets,
            filters,
        }
    }

    pub fn has_target(&self, ds_id: &str) -> bool {
        self.targets.iter().any(|t| t.delivery_service == ds_id)
    }

    /// The service a bypass filter sends `path` to, if any filter matches.
    pub fn bypass_destination(&self, path: &str) -> Option<&str> {
        self.filters
            .iter()
            .find(|f| f.matches(path))
            .map(|f| f.delivery_service.as_str())
    }
}
