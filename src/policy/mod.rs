//! Post-selection policy hooks.
//!
//! # Data Flow
//! ```text
//! chosen cache (single-answer HTTP)
//!     → AnonymousIpPolicy::enforce   (block or redirect anonymizers)
//!     → RegionalGeoPolicy::enforce   (allow, deny, alternate URL or path)
//!     → redirect URL
//! ```
//!
//! # Design Decisions
//! - Policies never see topology; they return a decision and the router
//!   turns it into a result category and URL
//! - Rule documents are validated as a whole: one bad rule rejects the load

pub mod anonymous;
pub mod regional;

use thiserror::Error;

use crate::routing::request::HttpRequest;
use crate::topology::Geolocation;

pub use anonymous::AnonymousIpList;
pub use regional::RegionalGeoRules;

/// Response code for an anonymous-IP block.
pub const ANONYMOUS_BLOCK_CODE: u16 = 403;

/// Response code for a regional-geo denial.
pub const REGIONAL_DENIED_CODE: u16 = 520;

/// Outcome of a policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    /// Refuse with this HTTP status.
    Block { status: u16 },
    /// Send the client to an absolute URL, bypassing cache selection.
    Redirect { url: String },
    /// Serve this path from the chosen cache instead of the requested one.
    AlternatePath { path: String },
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy document parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid rule for '{ds}': {reason}")]
    InvalidRule { ds: String, reason: String },
}

pub trait AnonymousIpPolicy: Send + Sync + std::fmt::Debug {
    fn enforce(&self, ds_id: &str, request: &HttpRequest) -> PolicyDecision;
}

pub trait RegionalGeoPolicy: Send + Sync + std::fmt::Debug {
    /// `client` is the resolved client location, if any.
    fn enforce(&self, ds_id: &str, request: &HttpRequest, client: Option<&Geolocation>) -> PolicyDecision;
}
