//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Routing cascade
//!     → track.rs (per-request Track: category, details, locations)
//!     → stats.rs (StatTracker flush at request end)
//!         → metrics.rs (counters, histogram)
//!
//! Consumers:
//!     → /crs/stats (StatTracker snapshot)
//!     → Metrics endpoint (Prometheus scrape)
//!     → logging.rs (tracing fmt subscriber)
//! ```
//!
//! # Design Decisions
//! - Track is single-owner and unsynchronized
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
pub mod stats;
pub mod track;

pub use stats::{StatTracker, StatsSnapshot};
pub use track::{ResultDetails, ResultType, RouteType, Track};
