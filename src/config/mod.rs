//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, overlay secrets from environment)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → handed to IntegrationGateway::new
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Secrets come from the environment and are never serialized back out
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::{
    BankingConfig, BatchConfig, CacheConfig, CredentialConfig, CredentialStoreKind, FiscalConfig, GatewayConfig,
    GroupwareConfig, ObservabilityConfig, RegistryConfig, RetryConfig, ServerConfig,
    TransportConfig,
};
