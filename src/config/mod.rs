//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! router.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RouterConfig (validated, immutable)
//!
//! snapshot documents (JSON: topology, coverage zones, federation,
//! geolocation tables, policies)
//!     → loader.rs (parse, reference-check, build)
//!     → TrafficRouter
//!     → RouterHandle (atomic publish)
//!
//! On document change:
//!     watcher.rs detects change
//!     → loader.rs builds a new TrafficRouter
//!     → RouterHandle::swap
//! ```
//!
//! # Design Decisions
//! - The config file is read once; only the snapshot documents hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A failed rebuild never replaces a working router

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load, load_config, load_router, ConfigError};
pub use schema::{ListenerConfig, ObservabilityConfig, RouterConfig, RoutingConfig, SnapshotConfig};
pub use validation::ValidationError;
pub use watcher::SnapshotWatcher;
