//! Credential lifecycle.
//!
//! # Responsibilities
//! - Keep a short-lived access credential usable, refreshing ahead of expiry
//! - Delegate every secret-bearing exchange to the server-side broker
//! - Persist credentials through the [`CredentialStore`] seam
//! - Start and complete the OAuth authorization flow
//!
//! # Security
//! - Token values are never logged; `Debug` impls redact them

pub mod broker;
pub mod manager;
pub mod store;
pub mod types;

pub use broker::{ApiKeyGrant, BrokerError, HttpTokenBroker, TokenBroker, BROKER_SECRET_HEADER};
pub use manager::{CredentialManager, OAuthSettings};
pub use store::{BrokerCredentialStore, CredentialStore, MemoryCredentialStore};
pub use types::{Credential, TokenResponse};
