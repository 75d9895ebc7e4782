//! Caller-facing error taxonomy.
//!
//! Transport failures are retried inside the layer; callers only ever see the
//! condensed variants below. Full endpoint context is logged when an
//! integration is declared unavailable.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::resilience::RetryError;
use crate::transport::types::{ErrorKind, TransportError};

/// Errors surfaced by every integration operation.
#[derive(Debug, Error)]
pub enum IntegrationError {
    /// The caller passed something the layer rejected without a network call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The authority rejected the request (4xx). Terminal.
    #[error("request rejected by {integration}: {source}")]
    Client {
        integration: &'static str,
        #[source]
        source: TransportError,
    },

    /// Transient failures persisted through every retry.
    #[error("{integration} is unavailable after {attempts} attempts")]
    Unavailable {
        integration: &'static str,
        endpoint: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// The credential can no longer be refreshed; re-authorization is required.
    #[error("authorization expired for account {account}: {reason}")]
    AuthExpired { account: String, reason: String },

    /// Clean negative answer for operations without a canonical negative result.
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// Fiscal cancellation attempted after the allowed window.
    #[error("cancellation window of {window_hours}h closed for {access_key} (issued at {issued_at})")]
    CancellationWindowClosed {
        access_key: String,
        issued_at: DateTime<Utc>,
        window_hours: i64,
    },

    /// The authority answered with something we could not decode.
    #[error("invalid response from {integration}: {source}")]
    InvalidResponse {
        integration: &'static str,
        #[source]
        source: TransportError,
    },

    /// Credential or contingency persistence failed.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Result type for integration operations.
pub type IntegrationResult<T> = Result<T, IntegrationError>;

impl IntegrationError {
    /// Condense a retried transport failure.
    pub fn from_retry(integration: &'static str, err: RetryError<TransportError>) -> Self {
        match err {
            RetryError::Exhausted { attempts, last } => {
                let endpoint = last.endpoint().to_string();
                tracing::warn!(
                    integration,
                    endpoint = %endpoint,
                    attempts,
                    kind = last.kind().as_str(),
                    error = %last,
                    "Integration unavailable"
                );
                IntegrationError::Unavailable {
                    integration,
                    endpoint,
                    attempts,
                    source: last,
                }
            }
            RetryError::Terminal(source) => Self::from_transport(integration, source),
        }
    }

    /// Condense a single, unretried transport failure.
    pub fn from_transport(integration: &'static str, source: TransportError) -> Self {
        match source.kind() {
            ErrorKind::Client => IntegrationError::Client {
                integration,
                source,
            },
            ErrorKind::InvalidResponse => IntegrationError::InvalidResponse {
                integration,
                source,
            },
            ErrorKind::RateLimited | ErrorKind::Server | ErrorKind::Network | ErrorKind::Timeout => {
                IntegrationError::Unavailable {
                    integration,
                    endpoint: source.endpoint().to_string(),
                    attempts: 1,
                    source,
                }
            }
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, IntegrationError::Unavailable { .. })
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, IntegrationError::AuthExpired { .. })
    }

    /// HTTP status of the underlying authority response, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            IntegrationError::Client { source, .. }
            | IntegrationError::Unavailable { source, .. }
            | IntegrationError::InvalidResponse { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// Errors from persistence collaborators (secure credential storage, contingency flag).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("stored data is corrupted: {0}")]
    Corrupted(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Corrupted(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_error() -> TransportError {
        TransportError::Server {
            endpoint: "GET https://registry.test/x".into(),
            status: 502,
            message: String::new(),
        }
    }

    #[test]
    fn test_exhausted_becomes_unavailable() {
        let err = IntegrationError::from_retry(
            "registry",
            RetryError::Exhausted {
                attempts: 2,
                last: server_error(),
            },
        );
        match err {
            IntegrationError::Unavailable {
                integration,
                endpoint,
                attempts,
                ..
            } => {
                assert_eq!(integration, "registry");
                assert_eq!(endpoint, "GET https://registry.test/x");
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_terminal_client_error_surfaces_as_is() {
        let source = TransportError::Client {
            endpoint: "POST /x".into(),
            status: 422,
            message: "bad field".into(),
        };
        let err = IntegrationError::from_retry("fiscal", RetryError::Terminal(source));
        assert!(matches!(err, IntegrationError::Client { .. }));
        assert_eq!(err.status(), Some(422));
    }

    #[test]
    fn test_error_display() {
        let err = IntegrationError::AuthExpired {
            account: "acc-1".into(),
            reason: "refresh token revoked".into(),
        };
        assert_eq!(
            err.to_string(),
            "authorization expired for account acc-1: refresh token revoked"
        );
    }
}
