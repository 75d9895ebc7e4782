//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All integrations produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Tokens, API keys and client secrets never appear in logs
//! - Metric updates are cheap no-ops when no recorder is installed

pub mod logging;
pub mod metrics;
