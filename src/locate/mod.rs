//! Client location collaborators.
//!
//! # Data Flow
//! ```text
//! client IP
//!     → NetworkIndex (coverage zone, deep coverage zone)   exact match
//!     → FederationRegistry                                  DNS only
//!     → GeolocationProviders → GeolocationService           fallback
//! ```
//!
//! # Design Decisions
//! - Collaborators are traits so external databases can be plugged in
//! - Built-in tables are in-memory longest-prefix CIDR maps

pub mod cidr;
pub mod coverage_zone;
pub mod federation;
pub mod geolocation;

pub use cidr::{Cidr, CidrError, CidrTable};
pub use coverage_zone::{CoverageZoneIndex, NetworkIndex, NetworkMatch};
pub use federation::{FederationRegistry, StaticFederationRegistry};
pub use geolocation::{GeolocationError, GeolocationProviders, GeolocationService, StaticGeolocation};
