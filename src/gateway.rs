//! Gateway assembly.
//!
//! # Responsibilities
//! - Build every enabled integration from one [`GatewayConfig`]
//! - Inject external collaborators (credential store, contingency store, banking sink)
//! - Own the background tasks and stop them on [`IntegrationGateway::shutdown`]
//!
//! # Design Decisions
//! - No global singletons: everything hangs off an explicitly constructed gateway
//! - Disabled integrations are simply absent (`None` accessors)

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::banking::{BankingClient, BankingSink, SnapshotSink, WebhookDispatcher};
use crate::config::{CredentialStoreKind, GatewayConfig};
use crate::credentials::{
    BrokerCredentialStore, CredentialManager, CredentialStore, HttpTokenBroker, MemoryCredentialStore, OAuthSettings,
};
use crate::error::{IntegrationError, IntegrationResult};
use crate::fiscal::{
    AuthorityHealth, ContingencyStateMachine, ContingencyStore, FileContingencyStore, FiscalClient,
    FiscalStatusMonitor, MemoryContingencyStore,
};
use crate::groupware::GroupwareClient;
use crate::lifecycle::Shutdown;
use crate::registry::RegistryLookup;
use crate::resilience::RetryPolicy;
use crate::transport::HttpTransport;

/// Collaborators supplied by the embedding application.
pub struct Collaborators {
    /// Overrides `credentials.store` when set.
    pub credential_store: Option<Arc<dyn CredentialStore>>,
    pub contingency_store: Arc<dyn ContingencyStore>,
    /// Receives banking webhook actions. Defaults to a [`SnapshotSink`].
    pub banking_sink: Option<Arc<dyn BankingSink>>,
}

impl Collaborators {
    /// Stores chosen by configuration: the credential store follows
    /// `credentials.store`, the contingency history goes to a file when configured.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let contingency_store: Arc<dyn ContingencyStore> = match &config.fiscal.contingency_state_path {
            Some(path) => Arc::new(FileContingencyStore::new(path)),
            None => Arc::new(MemoryContingencyStore::new()),
        };
        Self {
            credential_store: None,
            contingency_store,
            banking_sink: None,
        }
    }
}

pub struct IntegrationGateway {
    config: Arc<GatewayConfig>,
    registry: Option<Arc<RegistryLookup>>,
    credentials: Option<Arc<CredentialManager>>,
    groupware: Option<Arc<GroupwareClient>>,
    banking: Option<Arc<BankingClient>>,
    webhooks: Option<WebhookDispatcher>,
    fiscal: Option<Arc<FiscalClient>>,
    authority: Arc<AuthorityHealth>,
    shutdown: Mutex<Shutdown>,
}

impl IntegrationGateway {
    /// Build the gateway and start its background tasks.
    pub async fn new(config: GatewayConfig, collaborators: Collaborators) -> IntegrationResult<Self> {
        let transport =
            HttpTransport::new(&config.transport).map_err(|e| IntegrationError::from_transport("transport", e))?;
        let retry = RetryPolicy::from_config(&config.retries);
        let mut shutdown = Shutdown::new();

        let registry = config.registry.enabled.then(|| {
            let lookup = Arc::new(RegistryLookup::from_config(&config, transport.clone()));
            let sweeper = lookup
                .cache()
                .spawn_sweeper(Duration::from_secs(config.cache.sweep_interval_secs), shutdown.subscribe());
            shutdown.track("registry-cache-sweeper", sweeper);
            lookup
        });

        let broker = Arc::new(HttpTokenBroker::new(
            transport.clone(),
            retry.clone(),
            config.credentials.broker_url.clone(),
            config.credentials.broker_secret.clone(),
        ));

        let (credentials, groupware) = if config.groupware.enabled {
            let settings = OAuthSettings::from_groupware(&config.groupware);
            let store: Arc<dyn CredentialStore> = match (&collaborators.credential_store, config.credentials.store) {
                (Some(store), _) => store.clone(),
                (None, CredentialStoreKind::Memory) => Arc::new(MemoryCredentialStore::new()),
                (None, CredentialStoreKind::Broker) => {
                    Arc::new(BrokerCredentialStore::new(broker.clone(), settings.provider.clone()))
                }
            };
            tracing::info!(store = ?config.credentials.store, "Groupware credential store selected");

            let manager = Arc::new(CredentialManager::new(settings, &config.credentials, broker.clone(), store));
            let client = Arc::new(GroupwareClient::new(
                &config.groupware,
                transport.clone(),
                retry.clone(),
                manager.clone(),
            ));
            (Some(manager), Some(client))
        } else {
            (None, None)
        };

        let (banking, webhooks) = if config.banking.enabled {
            let client = Arc::new(BankingClient::new(&config.banking, transport.clone(), retry.clone(), broker));
            let sink = collaborators
                .banking_sink
                .clone()
                .unwrap_or_else(|| Arc::new(SnapshotSink::new(client.clone())) as Arc<dyn BankingSink>);
            (Some(client), Some(WebhookDispatcher::new(sink)))
        } else {
            (None, None)
        };

        let authority = Arc::new(AuthorityHealth::new());
        let fiscal = if config.fiscal.enabled {
            let contingency =
                ContingencyStateMachine::load(config.fiscal.owner.clone(), collaborators.contingency_store.clone())
                    .await?;
            let client = Arc::new(FiscalClient::new(
                &config.fiscal,
                transport.clone(),
                retry.clone(),
                Arc::new(contingency),
            ));
            let monitor = FiscalStatusMonitor::new(
                client.clone(),
                authority.clone(),
                Duration::from_secs(config.fiscal.probe_interval_secs),
                config.fiscal.auto_enable_contingency,
            );
            shutdown.track("fiscal-status-monitor", tokio::spawn(monitor.run(shutdown.subscribe())));
            Some(client)
        } else {
            None
        };

        tracing::info!(
            registry = registry.is_some(),
            groupware = groupware.is_some(),
            banking = banking.is_some(),
            fiscal = fiscal.is_some(),
            background_tasks = shutdown.task_count(),
            "Integration gateway ready"
        );

        Ok(Self {
            config: Arc::new(config),
            registry,
            credentials,
            groupware,
            banking,
            webhooks,
            fiscal,
            authority,
            shutdown: Mutex::new(shutdown),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> Option<&Arc<RegistryLookup>> {
        self.registry.as_ref()
    }

    pub fn credentials(&self) -> Option<&Arc<CredentialManager>> {
        self.credentials.as_ref()
    }

    pub fn groupware(&self) -> Option<&Arc<GroupwareClient>> {
        self.groupware.as_ref()
    }

    pub fn banking(&self) -> Option<&Arc<BankingClient>> {
        self.banking.as_ref()
    }

    pub fn webhooks(&self) -> Option<&WebhookDispatcher> {
        self.webhooks.as_ref()
    }

    pub fn fiscal(&self) -> Option<&Arc<FiscalClient>> {
        self.fiscal.as_ref()
    }

    pub fn authority_health(&self) -> &Arc<AuthorityHealth> {
        &self.authority
    }

    /// Receiver for tasks started outside the gateway (the webhook server).
    pub async fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown.lock().await.subscribe()
    }

    /// Let [`IntegrationGateway::shutdown`] wait for an externally started task.
    pub async fn track(&self, name: &'static str, handle: JoinHandle<()>) {
        self.shutdown.lock().await.track(name, handle);
    }

    /// Stop every background task and wait for them.
    pub async fn shutdown(&self) {
        tracing::info!("Integration gateway shutting down");
        self.shutdown.lock().await.drain().await;
        tracing::info!("Integration gateway stopped");
    }
}

impl std::fmt::Debug for IntegrationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationGateway")
            .field("registry", &self.registry.is_some())
            .field("groupware", &self.groupware.is_some())
            .field("banking", &self.banking.is_some())
            .field("fiscal", &self.fiscal.is_some())
            .finish()
    }
}
