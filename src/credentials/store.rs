//! Secure credential storage seam.

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use std::sync::Arc;

use crate::credentials::broker::{BrokerError, HttpTokenBroker};
use crate::credentials::types::Credential;
use crate::error::StoreError;

/// Persistence for the current credential. Implementations must keep tokens
/// out of logs.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn save(&self, credential: &Credential) -> Result<(), StoreError>;

    async fn get(&self) -> Result<Option<Credential>, StoreError>;

    /// Forget the stored credential.
    async fn revoke(&self) -> Result<(), StoreError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: ArcSwapOption<Credential>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: ArcSwapOption::from_pointee(credential),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        self.slot.store(Some(Arc::new(credential.clone())));
        Ok(())
    }

    async fn get(&self) -> Result<Option<Credential>, StoreError> {
        Ok(self.slot.load_full().map(|c| (*c).clone()))
    }

    async fn revoke(&self) -> Result<(), StoreError> {
        self.slot.store(None);
        Ok(())
    }
}

/// Credential held by the token broker, so it survives restarts and is shared
/// by every replica.
#[derive(Debug)]
pub struct BrokerCredentialStore {
    broker: Arc<HttpTokenBroker>,
    provider: String,
}

impl BrokerCredentialStore {
    pub fn new(broker: Arc<HttpTokenBroker>, provider: impl Into<String>) -> Self {
        Self {
            broker,
            provider: provider.into(),
        }
    }
}

fn unavailable(e: BrokerError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[async_trait]
impl CredentialStore for BrokerCredentialStore {
    async fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        self.broker
            .put_credential(&self.provider, credential)
            .await
            .map_err(unavailable)?;
        tracing::debug!(provider = %self.provider, account = %credential.account_id, "Credential stored with broker");
        Ok(())
    }

    async fn get(&self) -> Result<Option<Credential>, StoreError> {
        self.broker.get_credential(&self.provider).await.map_err(unavailable)
    }

    async fn revoke(&self) -> Result<(), StoreError> {
        self.broker.delete_credential(&self.provider).await.map_err(unavailable)
    }
}
