//! Credential lifecycle manager.
//!
//! # Data Flow
//! ```text
//! ensure_valid()
//!   → current credential (memory, else secure store)
//!   → now >= expires_at - buffer ? broker refresh → save → swap
//!   → broker rejection → AuthExpired (caller restarts authorization)
//! ```
//!
//! # Design Decisions
//! - The in-memory slot is swapped atomically; concurrent refreshes may both
//!   run and the latest write wins, unless the single-flight guard is enabled
//! - A broker outage while the old token is still unexpired returns the old token

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use url::Url;

use crate::config::validation::MAX_REFRESH_BUFFER_MINUTES;
use crate::config::{CredentialConfig, GroupwareConfig};
use crate::credentials::broker::{BrokerError, TokenBroker};
use crate::credentials::store::CredentialStore;
use crate::credentials::types::Credential;
use crate::error::{IntegrationError, IntegrationResult};
use crate::observability::metrics;

/// OAuth client settings. The client secret stays with the broker.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    /// Broker path segment naming the provider.
    pub provider: String,
    pub authorize_url: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// Account label used before any credential names one.
    pub account_hint: String,
}

impl OAuthSettings {
    pub fn from_groupware(config: &GroupwareConfig) -> Self {
        Self {
            provider: "groupware".to_string(),
            authorize_url: config.authorize_url.clone(),
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
            account_hint: config.account_hint.clone(),
        }
    }
}

pub struct CredentialManager {
    settings: OAuthSettings,
    broker: Arc<dyn TokenBroker>,
    store: Arc<dyn CredentialStore>,
    current: ArcSwapOption<Credential>,
    buffer: Duration,
    /// Per-account refresh guards; `None` tolerates duplicate refreshes.
    refresh_guards: Option<DashMap<String, Arc<Mutex<()>>>>,
}

impl CredentialManager {
    pub fn new(
        settings: OAuthSettings,
        config: &CredentialConfig,
        broker: Arc<dyn TokenBroker>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            settings,
            broker,
            store,
            current: ArcSwapOption::empty(),
            buffer: Duration::try_minutes(config.refresh_buffer_minutes.clamp(0, MAX_REFRESH_BUFFER_MINUTES))
                .unwrap_or(Duration::zero()),
            refresh_guards: config.single_flight_refresh.then(DashMap::new),
        }
    }

    /// Account of the current credential, or the configured hint.
    pub fn account(&self) -> String {
        self.current
            .load()
            .as_ref()
            .map(|c| c.account_id.clone())
            .unwrap_or_else(|| self.settings.account_hint.clone())
    }

    /// A credential that is not inside its refresh window.
    pub async fn ensure_valid(&self) -> IntegrationResult<Arc<Credential>> {
        let credential = self.load_current().await?;
        if !credential.needs_refresh_at(Utc::now(), self.buffer) {
            return Ok(credential);
        }

        match &self.refresh_guards {
            None => self.refresh(credential).await,
            Some(guards) => {
                let guard = guards
                    .entry(credential.account_id.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone();
                let _held = guard.lock().await;

                // Another caller may have refreshed while we waited.
                let latest = self.load_current().await?;
                if !latest.needs_refresh_at(Utc::now(), self.buffer) {
                    return Ok(latest);
                }
                self.refresh(latest).await
            }
        }
    }

    /// Bearer token for a dependent call.
    pub async fn access_token(&self) -> IntegrationResult<String> {
        Ok(self.ensure_valid().await?.access_token.clone())
    }

    async fn load_current(&self) -> IntegrationResult<Arc<Credential>> {
        if let Some(credential) = self.current.load_full() {
            return Ok(credential);
        }

        match self.store.get().await? {
            Some(stored) => {
                tracing::debug!(account = %stored.account_id, "Loaded credential from secure store");
                let stored = Arc::new(stored);
                self.current.store(Some(stored.clone()));
                Ok(stored)
            }
            None => Err(IntegrationError::AuthExpired {
                account: self.settings.account_hint.clone(),
                reason: "no credential stored, authorization required".to_string(),
            }),
        }
    }

    async fn refresh(&self, credential: Arc<Credential>) -> IntegrationResult<Arc<Credential>> {
        let Some(refresh_token) = credential.refresh_token.as_deref() else {
            metrics::record_credential_refresh("rejected");
            return Err(IntegrationError::AuthExpired {
                account: credential.account_id.clone(),
                reason: "no refresh token".to_string(),
            });
        };

        tracing::debug!(
            account = %credential.account_id,
            expires_at = %credential.expires_at,
            "Refreshing credential"
        );

        match self.broker.refresh(&self.settings.provider, refresh_token).await {
            Ok(response) => {
                let next = Arc::new(response.into_credential(
                    &self.settings.account_hint,
                    Some(&credential),
                    Utc::now(),
                ));
                self.store.save(&next).await?;
                self.current.store(Some(next.clone()));
                metrics::record_credential_refresh("success");
                tracing::info!(account = %next.account_id, expires_at = %next.expires_at, "Credential refreshed");
                Ok(next)
            }
            Err(BrokerError::Rejected(reason)) => {
                metrics::record_credential_refresh("rejected");
                tracing::warn!(account = %credential.account_id, %reason, "Credential refresh rejected");
                Err(IntegrationError::AuthExpired {
                    account: credential.account_id.clone(),
                    reason,
                })
            }
            Err(BrokerError::Integration(e)) => {
                metrics::record_credential_refresh("failure");
                if !credential.is_expired_at(Utc::now()) {
                    tracing::warn!(account = %credential.account_id, error = %e, "Credential refresh failed, using current token");
                    return Ok(credential);
                }
                Err(e)
            }
        }
    }

    /// URL that starts the authorization flow.
    pub fn authorize_url(&self, state: &str) -> IntegrationResult<Url> {
        let scope = self.settings.scopes.join(" ");
        Url::parse_with_params(
            &self.settings.authorize_url,
            &[
                ("client_id", self.settings.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("response_mode", "query"),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| IntegrationError::InvalidInput(format!("authorize url: {}", e)))
    }

    /// Complete the authorization flow with the code from the redirect.
    pub async fn exchange_code(&self, code: &str) -> IntegrationResult<Arc<Credential>> {
        if code.trim().is_empty() {
            return Err(IntegrationError::InvalidInput("authorization code is empty".into()));
        }

        let response = self
            .broker
            .exchange_code(&self.settings.provider, code, &self.settings.redirect_uri)
            .await
            .map_err(|e| match e {
                BrokerError::Rejected(reason) => IntegrationError::AuthExpired {
                    account: self.settings.account_hint.clone(),
                    reason,
                },
                BrokerError::Integration(e) => e,
            })?;

        let credential = Arc::new(response.into_credential(&self.settings.account_hint, None, Utc::now()));
        self.store.save(&credential).await?;
        self.current.store(Some(credential.clone()));
        tracing::info!(account = %credential.account_id, scopes = ?credential.scopes, "Account connected");
        Ok(credential)
    }

    /// Revoke the stored credential.
    pub async fn disconnect(&self) -> IntegrationResult<()> {
        let account = self.account();
        self.store.revoke().await?;
        self.current.store(None);
        tracing::info!(account = %account, "Account disconnected");
        Ok(())
    }
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("provider", &self.settings.provider)
            .field("buffer", &self.buffer)
            .field("single_flight", &self.refresh_guards.is_some())
            .field("current", &self.current.load_full())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::credentials::store::MemoryCredentialStore;
    use crate::credentials::types::TokenResponse;

    #[derive(Default)]
    struct FakeBroker {
        refreshes: AtomicU32,
        reject: bool,
    }

    #[async_trait]
    impl TokenBroker for FakeBroker {
        async fn refresh(&self, _provider: &str, refresh_token: &str) -> Result<TokenResponse, BrokerError> {
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(BrokerError::Rejected("invalid_grant".into()));
            }
            assert_eq!(refresh_token, "rt-1");
            tokio::task::yield_now().await;
            Ok(serde_json::from_value(serde_json::json!({
                "access_token": format!("at-{}", n + 2),
                "expires_in": 3600
            }))
            .unwrap())
        }

        async fn exchange_code(&self, _provider: &str, code: &str, _redirect_uri: &str) -> Result<TokenResponse, BrokerError> {
            if code != "good-code" {
                return Err(BrokerError::Rejected("invalid code".into()));
            }
            Ok(serde_json::from_value(serde_json::json!({
                "access_token": "at-new",
                "refresh_token": "rt-new",
                "expires_in": 3600,
                "scope": "Mail.Send",
                "account_id": "acc-2"
            }))
            .unwrap())
        }
    }

    fn settings() -> OAuthSettings {
        OAuthSettings::from_groupware(&GroupwareConfig {
            client_id: "client-123".into(),
            ..Default::default()
        })
    }

    fn credential(expires_in_secs: i64) -> Credential {
        Credential {
            access_token: "at-1".into(),
            refresh_token: Some("rt-1".into()),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
            scopes: vec![],
            account_id: "acc-1".into(),
        }
    }

    fn manager(broker: Arc<FakeBroker>, stored: Option<Credential>, single_flight: bool) -> (CredentialManager, Arc<MemoryCredentialStore>) {
        let store = Arc::new(match stored {
            Some(c) => MemoryCredentialStore::with_credential(c),
            None => MemoryCredentialStore::new(),
        });
        let config = CredentialConfig {
            single_flight_refresh: single_flight,
            ..Default::default()
        };
        (CredentialManager::new(settings(), &config, broker, store.clone()), store)
    }

    #[tokio::test]
    async fn test_fresh_credential_is_not_refreshed() {
        let broker = Arc::new(FakeBroker::default());
        let (manager, _) = manager(broker.clone(), Some(credential(3_600)), false);

        assert_eq!(manager.access_token().await.unwrap(), "at-1");
        assert_eq!(broker.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refresh_inside_buffer_persists_new_credential() {
        // Expires in 170s, buffer is 5 minutes.
        let broker = Arc::new(FakeBroker::default());
        let (manager, store) = manager(broker.clone(), Some(credential(170)), false);

        assert_eq!(manager.access_token().await.unwrap(), "at-2");
        assert_eq!(broker.refreshes.load(Ordering::SeqCst), 1);

        let saved = store.get().await.unwrap().unwrap();
        assert_eq!(saved.access_token, "at-2");
        assert_eq!(saved.refresh_token.as_deref(), Some("rt-1"));

        // The swapped credential is fresh now.
        manager.access_token().await.unwrap();
        assert_eq!(broker.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_refresh_is_auth_expired() {
        let broker = Arc::new(FakeBroker {
            reject: true,
            ..Default::default()
        });
        let (manager, _) = manager(broker, Some(credential(-10)), false);

        let err = manager.ensure_valid().await.unwrap_err();
        match err {
            IntegrationError::AuthExpired { account, reason } => {
                assert_eq!(account, "acc-1");
                assert_eq!(reason, "invalid_grant");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_credential_requires_authorization() {
        let (manager, _) = manager(Arc::new(FakeBroker::default()), None, false);
        assert!(manager.ensure_valid().await.unwrap_err().is_auth_expired());
    }

    #[tokio::test]
    async fn test_single_flight_refreshes_once() {
        let broker = Arc::new(FakeBroker::default());
        let (manager, _) = manager(broker.clone(), Some(credential(60)), true);
        let manager = Arc::new(manager);

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.access_token().await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "at-2");
        }
        assert_eq!(broker.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_authorize_url_and_code_exchange() {
        let (manager, store) = manager(Arc::new(FakeBroker::default()), None, false);

        let url = manager.authorize_url("xyz").unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "client-123");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["state"], "xyz");
        assert!(params["scope"].contains("offline_access"));

        assert!(manager.exchange_code("bad").await.unwrap_err().is_auth_expired());

        let credential = manager.exchange_code("good-code").await.unwrap();
        assert_eq!(credential.account_id, "acc-2");
        assert_eq!(manager.account(), "acc-2");
        assert!(store.get().await.unwrap().is_some());

        manager.disconnect().await.unwrap();
        assert!(store.get().await.unwrap().is_none());
        assert!(manager.ensure_valid().await.unwrap_err().is_auth_expired());
    }
}
