//! Integration resilience layer for unreliable external authorities.
//!
//! One uniform contract over a product registry, a fiscal-document authority,
//! an open-banking aggregator and a groupware provider: deadline-bounded
//! requests, retries with backoff, response caching, provider fallback,
//! credential refresh, paced batch lookups and a fiscal contingency mode.

// Leaves
pub mod error;
pub mod transport;
pub mod resilience;
pub mod cache;
pub mod batch;

// Integrations
pub mod registry;
pub mod credentials;
pub mod groupware;
pub mod banking;
pub mod fiscal;

// Assembly and cross-cutting concerns
pub mod config;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::schema::GatewayConfig;
pub use error::{IntegrationError, IntegrationResult};
pub use gateway::{Collaborators, IntegrationGateway};
pub use http::WebhookServer;
pub use lifecycle::Shutdown;
