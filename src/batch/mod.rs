//! Bounded-concurrency batch execution.
//!
//! # Data Flow
//! ```text
//! items (deduplicated, order kept)
//!     → windows of `concurrency` items
//!     → all items of a window run together (join, never short-circuit)
//!     → pacing delay between windows
//!     → BatchOutcome (exactly one result per distinct item)
//! ```

pub mod executor;

pub use executor::{BatchExecutor, BatchOutcome};
