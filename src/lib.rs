//! CDN traffic router library.
//!
//! The decision core ([`routing::TrafficRouter`]) is independent of any
//! transport. [`state::RouterHandle`] publishes it atomically, and the
//! [`lifecycle`] module wires the daemon around it.

pub mod config;
pub mod hash;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod locate;
pub mod observability;
pub mod policy;
pub mod routing;
pub mod state;
pub mod topology;

pub use config::schema::RouterConfig;
pub use http::InspectionServer;
pub use lifecycle::Shutdown;
pub use routing::{DnsRequest, HttpRequest, TrafficRouter};
pub use state::RouterHandle;
pub use topology::CacheRegister;
