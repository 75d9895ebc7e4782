//! Provider fallback orchestrator.
//!
//! # Data Flow
//! ```text
//! lookup(raw)
//!   → normalize (invalid → InvalidFormat, cached under the raw input)
//!   → cache check
//!   → preferred provider (with retries)
//!   → on NoData only: secondary provider (with retries)
//!   → canonical ProviderResult → cache with outcome TTL
//! ```
//!
//! # Design Decisions
//! - Fallback happens only on a clean negative; a transient failure of the
//!   preferred provider surfaces as `Unavailable` without consulting the secondary
//! - Errors are never cached

use std::sync::Arc;
use std::time::Duration;

use crate::batch::{BatchExecutor, BatchOutcome};
use crate::cache::{CacheOutcome, ResponseCache, TtlPolicy};
use crate::config::GatewayConfig;
use crate::error::{IntegrationError, IntegrationResult};
use crate::observability::metrics;
use crate::registry::providers::{AcceleratorProvider, PublicRegistryProvider, RegistryProvider};
use crate::registry::types::{ProviderAnswer, ProviderResult, RegistryNumber};
use crate::resilience::{transport_classifier, RetryPolicy};
use crate::transport::HttpTransport;

const INTEGRATION: &str = "registry";

/// Registry lookups with fallback, retries and caching.
pub struct RegistryLookup {
    preferred: Option<Arc<dyn RegistryProvider>>,
    secondary: Arc<dyn RegistryProvider>,
    retry: RetryPolicy,
    cache: ResponseCache<ProviderResult>,
    ttl: TtlPolicy,
    batch: BatchExecutor,
}

impl RegistryLookup {
    pub fn new(
        preferred: Option<Arc<dyn RegistryProvider>>,
        secondary: Arc<dyn RegistryProvider>,
        retry: RetryPolicy,
        ttl: TtlPolicy,
        batch: BatchExecutor,
    ) -> Self {
        Self {
            preferred,
            secondary,
            retry,
            cache: ResponseCache::new("registry"),
            ttl,
            batch,
        }
    }

    /// Wire the accelerator (when a key is configured) and the public registry.
    pub fn from_config(config: &GatewayConfig, transport: HttpTransport) -> Self {
        let registry = &config.registry;
        let timeout = registry.timeout_ms.map(Duration::from_millis);

        let preferred = registry.accelerator_api_key.as_ref().map(|key| {
            Arc::new(AcceleratorProvider::new(
                transport.clone(),
                registry.accelerator_url.clone(),
                key.clone(),
                timeout,
            )) as Arc<dyn RegistryProvider>
        });
        if preferred.is_none() {
            tracing::info!("Registry accelerator not configured, using public registry only");
        }

        let secondary = Arc::new(PublicRegistryProvider::new(
            transport,
            registry.public_url.clone(),
            timeout,
        ));

        Self::new(
            preferred,
            secondary,
            RetryPolicy::from_config(&config.retries),
            TtlPolicy::from(&config.cache),
            BatchExecutor::from_config(&config.batch),
        )
    }

    /// The lookup cache, exposed for the background sweeper and status reporting.
    pub fn cache(&self) -> &ResponseCache<ProviderResult> {
        &self.cache
    }

    /// Look up one identifier.
    pub async fn lookup(&self, raw: &str) -> IntegrationResult<ProviderResult> {
        let number = match RegistryNumber::parse(raw) {
            Ok(number) => number,
            Err(reason) => {
                tracing::debug!(input = raw, %reason, "Rejected registry identifier");
                let key = format!("raw:{}", raw);
                if let Some(cached) = self.cache.get(&key) {
                    return Ok(cached);
                }
                let result = ProviderResult::invalid_format(raw);
                self.store(key, &result);
                return Ok(result);
            }
        };

        if let Some(cached) = self.cache.get(number.as_str()) {
            tracing::debug!(identifier = %number, "Registry cache hit");
            return Ok(cached);
        }

        let result = self.resolve(&number).await?;
        self.store(number.to_string(), &result);
        Ok(result)
    }

    /// Look up many identifiers under the batch ceiling. Duplicates collapse.
    pub async fn lookup_many<I, S>(&self, identifiers: I) -> BatchOutcome<String, ProviderResult, IntegrationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let identifiers: Vec<String> = identifiers.into_iter().map(Into::into).collect();
        let outcome = self
            .batch
            .run(identifiers, |id| async move { self.lookup(&id).await })
            .await;

        tracing::info!(
            total = outcome.len(),
            succeeded = outcome.succeeded(),
            failed = outcome.failed(),
            "Registry batch completed"
        );
        outcome
    }

    async fn resolve(&self, number: &RegistryNumber) -> IntegrationResult<ProviderResult> {
        if let Some(preferred) = &self.preferred {
            match self.call(preferred.as_ref(), number).await? {
                Some(result) => return Ok(result),
                None => {
                    tracing::debug!(
                        identifier = %number,
                        from = preferred.kind().as_str(),
                        to = self.secondary.kind().as_str(),
                        "Preferred provider has no data, falling back"
                    );
                    metrics::record_fallback(INTEGRATION);
                }
            }
        }

        Ok(self
            .call(self.secondary.as_ref(), number)
            .await?
            .unwrap_or_else(|| ProviderResult::not_found(number, self.secondary.kind())))
    }

    /// One provider under the retry policy. `None` means a clean negative.
    async fn call(
        &self,
        provider: &dyn RegistryProvider,
        number: &RegistryNumber,
    ) -> IntegrationResult<Option<ProviderResult>> {
        let answer = self
            .retry
            .run(provider.kind().as_str(), transport_classifier, || provider.fetch(number))
            .await
            .map_err(|e| IntegrationError::from_retry(INTEGRATION, e))?;

        Ok(match answer {
            ProviderAnswer::Found(record) => {
                Some(ProviderResult::from_record(number, provider.kind(), record))
            }
            ProviderAnswer::NoData => None,
        })
    }

    fn store(&self, key: String, result: &ProviderResult) {
        let outcome = if result.valid {
            CacheOutcome::Positive
        } else {
            CacheOutcome::Negative
        };
        if let Some(ttl) = self.ttl.ttl_for(outcome) {
            self.cache.set(key, result.clone(), ttl);
        }
    }
}

impl std::fmt::Debug for RegistryLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryLookup")
            .field("preferred", &self.preferred.as_ref().map(|p| p.kind()))
            .field("secondary", &self.secondary.kind())
            .field("cache", &self.cache)
            .finish()
    }
}
