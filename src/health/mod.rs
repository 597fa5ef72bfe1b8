//! Health feed subsystem.
//!
//! # Data Flow
//! ```text
//! Health poller (poller.rs):
//!     Periodic timer
//!     → Read the feed document
//!     → Apply to the live router's register (state.rs)
//!
//! Inspection API:
//!     POST /crs/state
//!     → Apply to the live router's register (state.rs)
//! ```
//!
//! # Design Decisions
//! - No probing happens here: availability comes from an external monitor
//! - A feed mutates atomics in place; the router itself is never rebuilt
//! - Caches without a report have no authority and stay usable

pub mod poller;
pub mod state;

pub use poller::HealthPoller;
pub use state::{CacheHealth, HealthFeed, HealthSummary, ServiceHealth};
