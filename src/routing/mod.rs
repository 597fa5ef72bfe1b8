//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! DNS query (client ip, hostname, type)
//!     → register.match_dns → routing name check
//!     → availability (bypass records when down)
//!     → coverage zone → CZ-only miss → federation → geolocation
//!     → records (hashed by hostname, shuffled, or all)
//!
//! HTTP request (client ip, host, path, headers)
//!     → register.match_http
//!     → steering.rs (header, path filter, weighted hash over targets)
//!     → TLS gate → availability (bypass URL when down)
//!     → selector.rs (deep CZ → CZ → backups → closest → geo → geo redirect)
//!     → consistent hash over the location's caches (hash_key.rs)
//!     → policy hooks (anonymous ip, regional geo)
//!     → redirect URL
//! ```
//!
//! # Design Decisions
//! - A strict cascade with early returns; each step records its outcome
//!   on the request's Track
//! - Exhaustion is `None`, never an error: the next fallback decides
//! - Matchers compile once per snapshot; routing itself allocates only the
//!   candidate lists it hashes over

pub mod hash_key;
pub mod matcher;
pub mod request;
pub mod result;
pub mod router;
pub mod selector;
pub mod steering;

pub use request::{DnsRequest, HttpRequest, QueryType, STEERING_OPTION_HEADER};
pub use result::{DnsRouteResult, HttpRouteResult, InetRecord, RecordKind, RouteResult};
pub use router::{RouterOptions, TrafficRouter};
pub use selector::select_caches;
