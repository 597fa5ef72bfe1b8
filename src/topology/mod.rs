//! Topology: the entity model of one routing snapshot.
//!
//! # Data Flow
//! ```text
//! snapshot.json
//!     → snapshot.rs (serde document types)
//!     → register.rs (build + validate references)
//!     → CacheRegister { caches, locations, delivery services, steering }
//!
//! Health feed (out-of-band)
//!     → Cache::set_state / DeliveryService::set_state (atomics)
//! ```
//!
//! # Design Decisions
//! - Entities are rebuilt wholesale per snapshot
//! - Only availability flags change after build
//! - Locations own `Arc<Cache>` handles; backups are location ids

pub mod cache;
pub mod delivery_service;
pub mod geo;
pub mod location;
pub mod register;
pub mod snapshot;
pub mod steering;

pub use cache::{Availability, Cache, IpVersion};
pub use delivery_service::{DeepCachingType, DeliveryService, GeoRedirectKind, ServiceKind};
pub use geo::{order_locations, Geolocation, Locatable};
pub use location::{CacheLocation, LocalizationMethod};
pub use register::{CacheRegister, SnapshotError, SnapshotResult};
pub use snapshot::Snapshot;
pub use steering::{Steering, SteeringFilter, SteeringTarget};
