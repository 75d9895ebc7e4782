//! Inbound HTTP surface.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout)
//!     → auth.rs (shared webhook secret)
//!     → handlers.rs (webhook dispatch, OAuth redirect, health, status)
//! ```

pub mod auth;
pub mod handlers;
pub mod request;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, WebhookServer};
