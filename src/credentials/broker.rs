//! Server-side token broker client.
//!
//! Client secrets never live in this process: refreshes, code exchanges and
//! banking API keys are obtained from the broker, authenticated with a shared
//! secret header. The broker can also hold the current credential under
//! `/credentials/{provider}` (see `BrokerCredentialStore`).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::credentials::types::{Credential, TokenResponse};
use crate::error::IntegrationError;
use crate::resilience::{RetryError, RetryPolicy};
use crate::transport::types::{endpoint_url, ErrorKind, IntegrationRequest, Payload, TransportError};
use crate::transport::HttpTransport;

const INTEGRATION: &str = "broker";

/// Header carrying the broker shared secret.
pub const BROKER_SECRET_HEADER: &str = "X-Broker-Secret";

#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker refused the grant (revoked or missing refresh token, bad code).
    #[error("broker rejected the grant: {0}")]
    Rejected(String),

    #[error(transparent)]
    Integration(#[from] IntegrationError),
}

impl BrokerError {
    fn from_retry(err: RetryError<TransportError>) -> Self {
        // 400 and 401 from the broker mean the grant itself is unusable.
        if let RetryError::Terminal(source) = &err {
            if source.kind() == ErrorKind::Client && matches!(source.status(), Some(400 | 401 | 403)) {
                return BrokerError::Rejected(source.to_string());
            }
        }
        BrokerError::Integration(IntegrationError::from_retry(INTEGRATION, err))
    }
}

/// OAuth operations delegated to the broker.
#[async_trait]
pub trait TokenBroker: Send + Sync {
    async fn refresh(&self, provider: &str, refresh_token: &str) -> Result<TokenResponse, BrokerError>;

    async fn exchange_code(&self, provider: &str, code: &str, redirect_uri: &str) -> Result<TokenResponse, BrokerError>;
}

/// Broker-issued banking API key.
#[derive(Clone, Deserialize)]
pub struct ApiKeyGrant {
    pub api_key: String,
    /// Lifetime in seconds, when the broker reports one.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl std::fmt::Debug for ApiKeyGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyGrant")
            .field("api_key", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Deserialize)]
struct ConnectTokenResponse {
    #[serde(alias = "accessToken")]
    access_token: String,
}

/// HTTP broker client.
#[derive(Clone)]
pub struct HttpTokenBroker {
    transport: HttpTransport,
    retry: RetryPolicy,
    base_url: String,
    secret: Option<String>,
}

impl HttpTokenBroker {
    pub fn new(transport: HttpTransport, retry: RetryPolicy, base_url: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            transport,
            retry,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret,
        }
    }

    fn authorized(&self, request: IntegrationRequest) -> IntegrationRequest {
        match &self.secret {
            Some(secret) => request.header(BROKER_SECRET_HEADER, secret.clone()),
            None => request,
        }
    }

    fn post(&self, path: &str, body: serde_json::Value) -> IntegrationRequest {
        self.authorized(IntegrationRequest::post(INTEGRATION, format!("{}{}", self.base_url, path)).json(body))
    }

    fn credential_url(&self, provider: &str) -> Result<String, BrokerError> {
        Ok(endpoint_url(&self.base_url, &["credentials", provider])?)
    }

    async fn call<T: serde::de::DeserializeOwned>(&self, request: IntegrationRequest) -> Result<T, BrokerError> {
        let endpoint = request.endpoint();
        self.retry
            .execute(&self.transport, &request)
            .await
            .map_err(BrokerError::from_retry)?
            .into_json(&endpoint)
            .map_err(|e| BrokerError::Integration(IntegrationError::from_transport(INTEGRATION, e)))
    }

    /// Obtain a banking aggregator API key.
    pub async fn banking_api_key(&self) -> Result<ApiKeyGrant, BrokerError> {
        self.call(self.post("/banking/api-key", json!({}))).await
    }

    /// Obtain a connect token for the aggregator widget, optionally scoped to an existing item.
    pub async fn banking_connect_token(&self, item_id: Option<&str>) -> Result<String, BrokerError> {
        let body = match item_id {
            Some(id) => json!({ "itemId": id }),
            None => json!({}),
        };
        let response: ConnectTokenResponse = self.call(self.post("/banking/connect-token", body)).await?;
        Ok(response.access_token)
    }

    /// Store `credential` as the provider's current credential.
    pub async fn put_credential(&self, provider: &str, credential: &Credential) -> Result<(), BrokerError> {
        let body = serde_json::to_value(credential)
            .map_err(|e| IntegrationError::InvalidInput(format!("credential encoding: {}", e)))?;
        let request = self.authorized(IntegrationRequest::put(INTEGRATION, self.credential_url(provider)?).json(body));

        self.retry
            .execute(&self.transport, &request)
            .await
            .map_err(BrokerError::from_retry)?;
        Ok(())
    }

    /// The provider's current credential; `None` when the broker holds none.
    pub async fn get_credential(&self, provider: &str) -> Result<Option<Credential>, BrokerError> {
        let request = self.authorized(IntegrationRequest::get(INTEGRATION, self.credential_url(provider)?));
        let endpoint = request.endpoint();

        match self.retry.execute(&self.transport, &request).await {
            Ok(Payload::Empty) => Ok(None),
            Ok(payload) => payload
                .into_json(&endpoint)
                .map(Some)
                .map_err(|e| BrokerError::Integration(IntegrationError::from_transport(INTEGRATION, e))),
            Err(RetryError::Terminal(e)) if e.status() == Some(404) => Ok(None),
            Err(e) => Err(BrokerError::from_retry(e)),
        }
    }

    /// Drop the provider's credential. Deleting a missing one succeeds.
    pub async fn delete_credential(&self, provider: &str) -> Result<(), BrokerError> {
        let request = self.authorized(IntegrationRequest::delete(INTEGRATION, self.credential_url(provider)?));

        match self.retry.execute(&self.transport, &request).await {
            Ok(_) => Ok(()),
            Err(RetryError::Terminal(e)) if e.status() == Some(404) => Ok(()),
            Err(e) => Err(BrokerError::from_retry(e)),
        }
    }
}

#[async_trait]
impl TokenBroker for HttpTokenBroker {
    async fn refresh(&self, provider: &str, refresh_token: &str) -> Result<TokenResponse, BrokerError> {
        let path = format!("/oauth/{}/refresh", provider);
        self.call(self.post(&path, json!({ "refresh_token": refresh_token })))
            .await
    }

    async fn exchange_code(&self, provider: &str, code: &str, redirect_uri: &str) -> Result<TokenResponse, BrokerError> {
        let path = format!("/oauth/{}/token", provider);
        self.call(self.post(&path, json!({ "code": code, "redirect_uri": redirect_uri })))
            .await
    }
}

impl std::fmt::Debug for HttpTokenBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTokenBroker")
            .field("base_url", &self.base_url)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
