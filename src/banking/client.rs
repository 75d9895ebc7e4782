//! Open-banking aggregator client.
//!
//! # Design Decisions
//! - The API key comes from the broker and is cached until shortly before expiry
//! - A 401 drops the cached key and the call is retried once with a new one
//! - Transaction listing follows pagination until the last page

use std::sync::Arc;
use std::time::Duration;

use crate::banking::types::{Account, DateRange, Item, Page, ResultsPage, Transaction};
use crate::cache::ResponseCache;
use crate::config::BankingConfig;
use crate::credentials::{BrokerError, HttpTokenBroker};
use crate::error::{IntegrationError, IntegrationResult};
use crate::resilience::{RetryError, RetryPolicy};
use crate::transport::types::{endpoint_url, IntegrationRequest};
use crate::transport::HttpTransport;

const INTEGRATION: &str = "banking";
const API_KEY_HEADER: &str = "X-API-KEY";
const API_KEY_SLOT: &str = "api_key";
/// Keys are dropped this long before the broker-reported expiry.
const API_KEY_MARGIN: Duration = Duration::from_secs(600);
/// Upper bound on followed pages.
const MAX_PAGES: u32 = 1_000;

pub struct BankingClient {
    transport: HttpTransport,
    retry: RetryPolicy,
    broker: Arc<HttpTokenBroker>,
    base_url: String,
    page_size: u32,
    key_ttl: Duration,
    api_key: ResponseCache<String>,
}

impl BankingClient {
    pub fn new(config: &BankingConfig, transport: HttpTransport, retry: RetryPolicy, broker: Arc<HttpTokenBroker>) -> Self {
        Self {
            transport,
            retry,
            broker,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            page_size: config.page_size.max(1),
            key_ttl: Duration::from_secs(config.api_key_ttl_secs),
            api_key: ResponseCache::new("banking_api_key"),
        }
    }

    fn broker_error(e: BrokerError) -> IntegrationError {
        match e {
            BrokerError::Rejected(reason) => IntegrationError::AuthExpired {
                account: INTEGRATION.to_string(),
                reason,
            },
            BrokerError::Integration(e) => e,
        }
    }

    async fn api_key(&self) -> IntegrationResult<String> {
        if let Some(key) = self.api_key.get(API_KEY_SLOT) {
            return Ok(key);
        }

        let grant = self.broker.banking_api_key().await.map_err(Self::broker_error)?;
        let ttl = grant
            .expires_in
            .map(|secs| Duration::from_secs(secs).saturating_sub(API_KEY_MARGIN))
            .unwrap_or(self.key_ttl);
        self.api_key.set(API_KEY_SLOT, grant.api_key.clone(), ttl);
        tracing::debug!(ttl = ?ttl, "Obtained banking API key");
        Ok(grant.api_key)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, segments: &[&str], query: &[(&str, String)]) -> IntegrationResult<T> {
        let mut request = IntegrationRequest::get(INTEGRATION, endpoint_url(&self.base_url, segments)?);
        for (key, value) in query {
            request = request.query(*key, value.clone());
        }
        let endpoint = request.endpoint();

        let mut reauthenticated = false;
        loop {
            let key = self.api_key().await?;
            let attempt = request.clone().header(API_KEY_HEADER, key);

            match self.retry.execute(&self.transport, &attempt).await {
                Ok(payload) => {
                    return payload
                        .into_json(&endpoint)
                        .map_err(|e| IntegrationError::from_transport(INTEGRATION, e))
                }
                Err(RetryError::Terminal(e)) if e.status() == Some(401) && !reauthenticated => {
                    tracing::info!(endpoint = %endpoint, "Banking API key rejected, fetching a new one");
                    self.api_key.remove(API_KEY_SLOT);
                    reauthenticated = true;
                }
                Err(e) => return Err(IntegrationError::from_retry(INTEGRATION, e)),
            }
        }
    }

    /// Connect token for the aggregator widget, scoped to `item_id` when updating a connection.
    pub async fn create_connect_token(&self, item_id: Option<&str>) -> IntegrationResult<String> {
        self.broker
            .banking_connect_token(item_id)
            .await
            .map_err(Self::broker_error)
    }

    pub async fn get_item(&self, item_id: &str) -> IntegrationResult<Item> {
        if item_id.trim().is_empty() {
            return Err(IntegrationError::InvalidInput("item id is empty".into()));
        }
        self.get(&["items", item_id], &[]).await
    }

    pub async fn list_accounts(&self, item_id: &str) -> IntegrationResult<Vec<Account>> {
        let page: ResultsPage<Account> = self.get(&["accounts"], &[("itemId", item_id.to_string())]).await?;
        Ok(page.results)
    }

    /// Every transaction of `account_id` in `range`, all pages collected.
    pub async fn list_transactions(&self, account_id: &str, range: DateRange) -> IntegrationResult<Vec<Transaction>> {
        let mut transactions = Vec::new();
        let mut page_number = 1u32;

        loop {
            let mut query = vec![
                ("accountId", account_id.to_string()),
                ("pageSize", self.page_size.to_string()),
                ("page", page_number.to_string()),
            ];
            if let Some(from) = range.from {
                query.push(("from", from.to_string()));
            }
            if let Some(to) = range.to {
                query.push(("to", to.to_string()));
            }

            let page: Page<Transaction> = self.get(&["transactions"], &query).await?;
            transactions.extend(page.results);

            if page_number >= page.total_pages || page_number >= MAX_PAGES {
                break;
            }
            page_number += 1;
        }

        tracing::debug!(account_id, pages = page_number, count = transactions.len(), "Transactions listed");
        Ok(transactions)
    }
}

impl std::fmt::Debug for BankingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BankingClient")
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .finish()
    }
}
