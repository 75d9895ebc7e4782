//! Response caching.
//!
//! # Data Flow
//! ```text
//! lookup result
//!     → policy.rs (outcome → TTL, or no caching at all)
//!     → store.rs (DashMap keyed by normalized identifier)
//!     → background sweeper removes expired entries
//! ```
//!
//! # Design Decisions
//! - Expired entries are invisible to readers even before the sweeper runs
//! - Concurrent writers race last-write-wins; entries are idempotent per key

pub mod policy;
pub mod store;

pub use policy::{CacheOutcome, TtlPolicy};
pub use store::{CacheEntry, ResponseCache};
