//! Inbound aggregator webhooks.
//!
//! # Data Flow
//! ```text
//! POST /webhooks/banking → WebhookEvent → WebhookAction → BankingSink
//! ```
//!
//! Unknown event names are accepted and ignored so the aggregator never retries them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::banking::client::BankingClient;
use crate::banking::types::{ConnectionStatus, DateRange};
use crate::error::IntegrationResult;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookEventKind {
    #[serde(rename = "item/created")]
    ItemCreated,
    #[serde(rename = "item/updated")]
    ItemUpdated,
    #[serde(rename = "item/error")]
    ItemError,
    #[serde(rename = "item/login_required")]
    ItemLoginRequired,
    #[serde(rename = "item/deleted")]
    ItemDeleted,
    #[serde(rename = "transactions/created")]
    TransactionsCreated,
    #[serde(other)]
    Unknown,
}

impl WebhookEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventKind::ItemCreated => "item/created",
            WebhookEventKind::ItemUpdated => "item/updated",
            WebhookEventKind::ItemError => "item/error",
            WebhookEventKind::ItemLoginRequired => "item/login_required",
            WebhookEventKind::ItemDeleted => "item/deleted",
            WebhookEventKind::TransactionsCreated => "transactions/created",
            WebhookEventKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub event: WebhookEventKind,
    pub item_id: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub triggered_by: Option<String>,
}

/// What a webhook asks the application to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAction {
    Resync,
    UpdateStatus(ConnectionStatus),
    Remove,
    Ignore,
}

impl WebhookEvent {
    pub fn action(&self) -> WebhookAction {
        match self.event {
            WebhookEventKind::ItemCreated
            | WebhookEventKind::ItemUpdated
            | WebhookEventKind::TransactionsCreated => WebhookAction::Resync,
            WebhookEventKind::ItemError => WebhookAction::UpdateStatus(ConnectionStatus::Error),
            WebhookEventKind::ItemLoginRequired => WebhookAction::UpdateStatus(ConnectionStatus::LoginRequired),
            WebhookEventKind::ItemDeleted => WebhookAction::Remove,
            WebhookEventKind::Unknown => WebhookAction::Ignore,
        }
    }
}

/// Application side of the banking integration.
#[async_trait]
pub trait BankingSink: Send + Sync {
    async fn resync(&self, item_id: &str) -> IntegrationResult<()>;

    async fn update_status(&self, item_id: &str, status: ConnectionStatus) -> IntegrationResult<()>;

    async fn remove(&self, item_id: &str) -> IntegrationResult<()>;
}

/// Routes webhook events to a [`BankingSink`].
#[derive(Clone)]
pub struct WebhookDispatcher {
    sink: Arc<dyn BankingSink>,
}

impl WebhookDispatcher {
    pub fn new(sink: Arc<dyn BankingSink>) -> Self {
        Self { sink }
    }

    /// Apply one event and return the action taken.
    pub async fn dispatch(&self, event: &WebhookEvent) -> IntegrationResult<WebhookAction> {
        let action = event.action();
        metrics::record_webhook(event.event.as_str());
        tracing::info!(event = event.event.as_str(), item_id = %event.item_id, action = ?action, "Banking webhook received");

        match action {
            WebhookAction::Resync => self.sink.resync(&event.item_id).await?,
            WebhookAction::UpdateStatus(status) => self.sink.update_status(&event.item_id, status).await?,
            WebhookAction::Remove => self.sink.remove(&event.item_id).await?,
            WebhookAction::Ignore => {}
        }
        Ok(action)
    }

    /// Dispatch in the background; the webhook response must not wait on re-syncs.
    pub fn spawn(&self, event: WebhookEvent) -> WebhookAction {
        let action = event.action();
        let dispatcher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.dispatch(&event).await {
                tracing::error!(event = event.event.as_str(), item_id = %event.item_id, error = %e, "Banking webhook handling failed");
            }
        });
        action
    }
}

/// Last synchronized view of one connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub item_id: String,
    pub status: ConnectionStatus,
    pub accounts: usize,
    pub transactions: usize,
    pub synced_at: Option<DateTime<Utc>>,
}

/// Sink that re-fetches connections through the [`BankingClient`] and keeps
/// the latest snapshot in memory.
pub struct SnapshotSink {
    client: Arc<BankingClient>,
    connections: DashMap<String, ConnectionSnapshot>,
}

impl SnapshotSink {
    pub fn new(client: Arc<BankingClient>) -> Self {
        Self {
            client,
            connections: DashMap::new(),
        }
    }

    pub fn snapshot(&self, item_id: &str) -> Option<ConnectionSnapshot> {
        self.connections.get(item_id).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[async_trait]
impl BankingSink for SnapshotSink {
    async fn resync(&self, item_id: &str) -> IntegrationResult<()> {
        let item = self.client.get_item(item_id).await?;
        let accounts = self.client.list_accounts(item_id).await?;

        let mut transactions = 0;
        for account in &accounts {
            transactions += self
                .client
                .list_transactions(&account.id, DateRange::default())
                .await?
                .len();
        }

        // An unrecognized item status keeps whatever the webhooks last reported.
        let status = item.status.connection_status().unwrap_or_else(|| {
            self.connections
                .get(item_id)
                .map_or(ConnectionStatus::Active, |s| s.status)
        });

        tracing::info!(item_id, item_status = ?item.status, status = ?status, accounts = accounts.len(), transactions, "Banking connection synchronized");
        self.connections.insert(
            item_id.to_string(),
            ConnectionSnapshot {
                item_id: item_id.to_string(),
                status,
                accounts: accounts.len(),
                transactions,
                synced_at: Some(Utc::now()),
            },
        );
        Ok(())
    }

    async fn update_status(&self, item_id: &str, status: ConnectionStatus) -> IntegrationResult<()> {
        self.connections
            .entry(item_id.to_string())
            .and_modify(|s| s.status = status)
            .or_insert_with(|| ConnectionSnapshot {
                item_id: item_id.to_string(),
                status,
                accounts: 0,
                transactions: 0,
                synced_at: None,
            });
        Ok(())
    }

    async fn remove(&self, item_id: &str) -> IntegrationResult<()> {
        self.connections.remove(item_id);
        Ok(())
    }
}
