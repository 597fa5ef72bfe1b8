//! Inspection API.
//!
//! # Data Flow
//! ```text
//! operator / router-cli
//!     → server.rs (Axum router, tracing, request id, timeout)
//!     → handlers.rs (parse query, load current snapshot)
//!     → TrafficRouter inspection / routing entry points
//!     → JSON response (error.rs maps failures to status codes)
//! ```
//!
//! # Design Decisions
//! - Read-only against the routing snapshot, except `POST /crs/state`
//!   which applies a health feed
//! - Every handler works on the snapshot it loaded at entry
//! - Route endpoints go through `RouterHandle` so their results are tallied
//!   like real traffic

pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, InspectionServer};
