//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files, and
//! every section has defaults so a minimal file only names what differs.

use serde::{Deserialize, Serialize};

use crate::fiscal::types::ContingencyType;

/// Root configuration for the integration gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Outbound HTTP settings.
    pub transport: TransportConfig,

    /// Retry policy shared by every integration.
    pub retries: RetryConfig,

    /// Response cache TTLs and sweeping.
    pub cache: CacheConfig,

    /// Batch lookup concurrency and pacing.
    pub batch: BatchConfig,

    /// Product registry authority.
    pub registry: RegistryConfig,

    /// Credential lifecycle and token broker.
    pub credentials: CredentialConfig,

    /// Groupware provider (mail, calendar, meetings, files).
    pub groupware: GroupwareConfig,

    /// Open-banking aggregator.
    pub banking: BankingConfig,

    /// Fiscal-document authority and contingency.
    pub fiscal: FiscalConfig,

    /// Inbound webhook / status server.
    pub server: ServerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Outbound HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Default per-request deadline in milliseconds.
    pub request_timeout_ms: u64,

    /// TCP/TLS connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// User-Agent sent to every authority.
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 15_000,
            connect_timeout_ms: 5_000,
            user_agent: concat!("integration-gateway/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Extra random delay as a fraction of the computed delay (0.0 - 1.0).
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            jitter_ratio: 0.0,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for confirmed-valid lookups in seconds.
    pub positive_ttl_secs: u64,

    /// TTL for confirmed-negative lookups in seconds.
    pub negative_ttl_secs: u64,

    /// Interval between background sweeps in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            positive_ttl_secs: 86_400,
            negative_ttl_secs: 3_600,
            sweep_interval_secs: 300,
        }
    }
}

/// Batch execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Items executed concurrently per window.
    pub concurrency: usize,

    /// Delay between windows in milliseconds.
    pub pacing_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            pacing_ms: 500,
        }
    }
}

/// Product registry authority configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Enable registry lookups.
    pub enabled: bool,

    /// Base URL of the paid accelerator.
    pub accelerator_url: String,

    /// Accelerator token. Without it the accelerator is skipped.
    /// Usually supplied through `GATEWAY_REGISTRY_API_KEY`.
    #[serde(default, skip_serializing)]
    pub accelerator_api_key: Option<String>,

    /// Base URL of the public registry.
    pub public_url: String,

    /// Per-request deadline override in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            accelerator_url: "https://api.infosimples.com/api/v2".to_string(),
            accelerator_api_key: None,
            public_url: "https://consultas.anvisa.gov.br/api".to_string(),
            timeout_ms: Some(10_000),
        }
    }
}

/// Where the current OAuth credential is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStoreKind {
    /// Process memory; the account must be reconnected after a restart.
    #[default]
    Memory,
    /// The token broker's `/credentials/{provider}` resource.
    Broker,
}

/// Credential lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Credential persistence.
    pub store: CredentialStoreKind,

    /// Refresh this many minutes before expiry.
    pub refresh_buffer_minutes: i64,

    /// Serialize refreshes per account instead of tolerating duplicates.
    pub single_flight_refresh: bool,

    /// Base URL of the server-side token broker.
    pub broker_url: String,

    /// Shared secret presented to the broker (`GATEWAY_BROKER_SECRET`).
    #[serde(default, skip_serializing)]
    pub broker_secret: Option<String>,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            store: CredentialStoreKind::Memory,
            refresh_buffer_minutes: 5,
            single_flight_refresh: false,
            broker_url: "http://127.0.0.1:8787".to_string(),
            broker_secret: None,
        }
    }
}

/// Groupware provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GroupwareConfig {
    /// Enable groupware calls.
    pub enabled: bool,

    /// Base URL of the provider API.
    pub api_url: String,

    /// OAuth authorize endpoint.
    pub authorize_url: String,

    /// OAuth client id (public; the secret stays with the broker).
    pub client_id: String,

    /// Redirect URI registered with the provider.
    pub redirect_uri: String,

    /// Scopes requested during authorization.
    pub scopes: Vec<String>,

    /// Account label used until the first credential names one.
    pub account_hint: String,
}

impl Default for GroupwareConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://graph.microsoft.com/v1.0".to_string(),
            authorize_url: "https://login.microsoftonline.com/common/oauth2/v2.0/authorize"
                .to_string(),
            client_id: String::new(),
            redirect_uri: "http://localhost:8080/oauth/groupware/callback".to_string(),
            scopes: [
                "offline_access",
                "User.Read",
                "Mail.Send",
                "Calendars.ReadWrite",
                "OnlineMeetings.ReadWrite",
                "Files.ReadWrite",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            account_hint: "default".to_string(),
        }
    }
}

/// Open-banking aggregator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BankingConfig {
    /// Enable banking calls and webhooks.
    pub enabled: bool,

    /// Base URL of the aggregator API.
    pub api_url: String,

    /// How long a broker-issued API key is reused, in seconds.
    pub api_key_ttl_secs: u64,

    /// Transactions requested per page.
    pub page_size: u32,
}

impl Default for BankingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://api.pluggy.ai".to_string(),
            api_key_ttl_secs: 6_600,
            page_size: 500,
        }
    }
}

/// Fiscal authority configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FiscalConfig {
    /// Enable fiscal operations and the status monitor.
    pub enabled: bool,

    /// Base URL of the fiscal-document API.
    pub api_url: String,

    /// API token for the fiscal-document API.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Entity owning the contingency flag (e.g. the issuing company).
    pub owner: String,

    /// Cancellation is only allowed this many hours after issuance.
    pub cancel_window_hours: i64,

    /// Interval between status probes in seconds.
    pub probe_interval_secs: u64,

    /// Deadline of a single status probe in milliseconds.
    pub probe_timeout_ms: u64,

    /// Contingency type entered automatically when a probe fails. Never auto-disabled.
    pub auto_enable_contingency: Option<ContingencyType>,

    /// JSON file persisting contingency history. In-memory when absent.
    pub contingency_state_path: Option<String>,
}

impl Default for FiscalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "http://127.0.0.1:9100".to_string(),
            api_key: None,
            owner: "default".to_string(),
            cancel_window_hours: 24,
            probe_interval_secs: 60,
            probe_timeout_ms: 5_000,
            auto_enable_contingency: None,
            contingency_state_path: None,
        }
    }
}

/// Inbound server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout for inbound calls in seconds.
    pub request_timeout_secs: u64,

    /// Shared secret expected in `X-Webhook-Secret` (`GATEWAY_WEBHOOK_SECRET`).
    #[serde(default, skip_serializing)]
    pub webhook_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            webhook_secret: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [registry]
            enabled = true

            [batch]
            concurrency = 8
            "#,
        )
        .unwrap();

        assert!(config.registry.enabled);
        assert_eq!(config.batch.concurrency, 8);
        assert_eq!(config.batch.pacing_ms, 500);
        assert_eq!(config.cache.positive_ttl_secs, 86_400);
        assert_eq!(config.cache.negative_ttl_secs, 3_600);
        assert_eq!(config.credentials.refresh_buffer_minutes, 5);
    }

    #[test]
    fn test_contingency_type_in_config() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [fiscal]
            enabled = true
            auto_enable_contingency = "SVC-AN"
            "#,
        )
        .unwrap();
        assert_eq!(config.fiscal.auto_enable_contingency, Some(ContingencyType::SvcAn));
    }

    #[test]
    fn test_credential_store_kind() {
        let config: GatewayConfig = toml::from_str("[credentials]\nstore = \"broker\"\n").unwrap();
        assert_eq!(config.credentials.store, CredentialStoreKind::Broker);
        assert_eq!(GatewayConfig::default().credentials.store, CredentialStoreKind::Memory);
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let mut config = GatewayConfig::default();
        config.registry.accelerator_api_key = Some("secret-token".into());
        let rendered = toml::to_string(&config).unwrap();
        assert!(!rendered.contains("secret-token"));
    }
}
