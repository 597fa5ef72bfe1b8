//! Geographic points and distance ordering.

use serde::{Deserialize, Serialize};

/// Mean earth radius used for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A resolved geographic position plus the administrative attributes that
/// geo-limit constraints and regional rules match on.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Geolocation {
    pub latitude: f64,
    pub longitude: f64,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    /// Set by geolocation providers when they fell back to a country centroid.
    pub default_location: bool,
}

impl Geolocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            ..Self::default()
        }
    }

    pub fn with_country(mut self, code: impl Into<String>) -> Self {
        self.country_code = Some(code.into());
        self
    }

    pub fn with_postal_code(mut self, postal: impl Into<String>) -> Self {
        self.postal_code = Some(postal.into());
        self
    }

    pub fn as_default_location(mut self) -> Self {
        self.default_location = true;
        self
    }

    /// Haversine distance in kilometres.
    pub fn distance_to(&self, other: &Geolocation) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_KM * c
    }

    /// Look up an attribute by the key used in geo-limit constraints.
    pub fn property(&self, key: &str) -> Option<&str> {
        match key {
            "countryCode" => self.country_code.as_deref(),
            "countryName" => self.country_name.as_deref(),
            "city" => self.city.as_deref(),
            "postalCode" => self.postal_code.as_deref(),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }
}

/// Anything with a fixed position that can be sorted by distance.
pub trait Locatable {
    fn geolocation(&self) -> &Geolocation;
}

impl<T: Locatable + ?Sized> Locatable for std::sync::Arc<T> {
    fn geolocation(&self) -> &Geolocation {
        (**self).geolocation()
    }
}

/// Sort `locations` nearest-first relative to `client`. The sort is stable,
/// so equidistant locations keep their input order.
pub fn order_locations<T: Locatable>(locations: &mut [T], client: &Geolocation) {
    locations.sort_by(|a, b| {
        let da = client.distance_to(a.geolocation());
        let db = client.distance_to(b.geolocation());
        da.total_cmp(&db)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Site(&'static str, Geolocation);

    impl Locatable for Site {
        fn geolocation(&self) -> &Geolocation {
            &self.1
        }
    }

    #[test]
    fn test_distance_zero_for_same_point() {
        let denver = Geolocation::new(39.74, -104.99);
        assert!(denver.distance_to(&denver) < 1e-9);
    }

    #[test]
    fn test_distance_known_pair() {
        // Denver to New York is roughly 2620 km.
        let denver = Geolocation::new(39.7392, -104.9903);
        let nyc = Geolocation::new(40.7128, -74.0060);
        let d = denver.distance_to(&nyc);
        assert!((2550.0..2700.0).contains(&d), "unexpected distance {d}");
    }

    #[test]
    fn test_order_locations_nearest_first() {
        let client = Geolocation::new(40.0, -105.0);
        let mut sites = vec![
            Site("east", Geolocation::new(40.7, -74.0)),
            Site("west", Geolocation::new(37.7, -122.4)),
            Site("local", Geolocation::new(39.7, -104.9)),
        ];
        order_locations(&mut sites, &client);
        let names: Vec<&str> = sites.iter().map(|s| s.0).collect();
        assert_eq!(names, vec!["local", "west", "east"]);
    }

    #[test]
    fn test_property_lookup() {
        let geo = Geolocation::new(1.0, 2.0).with_country("US").with_postal_code("80202");
        assert_eq!(geo.property("countryCode"), Some("US"));
        assert_eq!(geo.property("postalCode"), Some("80202"));
        assert_eq!(geo.property("city"), None);
        assert_eq!(geo.property("unknown"), None);
    }
}
