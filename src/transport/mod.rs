//! Outbound HTTP transport.
//!
//! # Data Flow
//! ```text
//! IntegrationRequest
//!     → client.rs (deadline, send, status classification)
//!     → Payload (JSON / text / empty, negotiated from Content-Type)
//! ```
//!
//! # Design Decisions
//! - Every call has a deadline; exceeding it yields `Timeout`, never `Network`
//! - Status classification lives here so every integration agrees on what is transient
//! - No retries at this level; see `resilience::retries`

pub mod client;
pub mod types;

pub use client::HttpTransport;
pub use types::{endpoint_url, ErrorKind, IntegrationRequest, Payload, RequestBody, TransportError};
