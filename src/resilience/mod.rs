//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to an external authority:
//!     → timeouts.rs (enforce per-call deadline)
//!     → On failure: retries.rs (classify, retry transient failures with backoff)
//!     → backoff.rs (delay = min(base * 2^attempt, cap))
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - One retry loop for every integration, parameterized by an error classifier
//! - Client errors are never retried
//! - Exhaustion is reported distinctly from terminal failures

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use retries::{transport_classifier, RetryDecision, RetryError, RetryPolicy};
