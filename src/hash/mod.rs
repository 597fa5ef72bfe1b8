//! Consistent hashing subsystem.
//!
//! # Data Flow
//! ```text
//! Snapshot build:
//!     entity identity ("cache-01", "ds-a", ...)
//!     → hashable.rs (identity + "--" + i → SHA-256 → f64, sorted + deduped)
//!     → ReplicaSet frozen on the entity
//!
//! Request time:
//!     hash key (significant path + query params, or hostname)
//!     → hash_value(key)
//!     → consistent.rs (closest replica per candidate → rank by error)
//!     → top candidate, or top-N for multi-answer responses
//! ```
//!
//! # Design Decisions
//! - Replica points are computed once per snapshot and never mutated
//! - Selection is a pure function of (candidates, key): lock-free and reentrant
//! - Out-of-range targets clamp to the first/last replica (no ring wraparound)
//! - Exact error ties are broken deterministically, never dropped

pub mod consistent;
pub mod hashable;

pub use consistent::{ConsistentHasher, Dispersion};
pub use hashable::{hash_value, Hashable, ReplicaSet};
