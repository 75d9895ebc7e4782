//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable carrying the registry accelerator token.
pub const REGISTRY_API_KEY_ENV_VAR: &str = "GATEWAY_REGISTRY_API_KEY";
/// Environment variable carrying the token broker secret.
pub const BROKER_SECRET_ENV_VAR: &str = "GATEWAY_BROKER_SECRET";
/// Environment variable carrying the inbound webhook secret.
pub const WEBHOOK_SECRET_ENV_VAR: &str = "GATEWAY_WEBHOOK_SECRET";
/// Environment variable carrying the fiscal API token.
pub const FISCAL_API_KEY_ENV_VAR: &str = "GATEWAY_FISCAL_API_KEY";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, overlay secrets, and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse configuration text, overlay secrets, and validate.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content)?;
    prepare_config(config, |name| std::env::var(name).ok())
}

/// Built-in defaults when no file is given, with the same overlay and validation.
pub fn load_default_config() -> Result<GatewayConfig, ConfigError> {
    prepare_config(GatewayConfig::default(), |name| std::env::var(name).ok())
}

/// Overlay secrets from `lookup`, then validate.
pub fn prepare_config<F>(mut config: GatewayConfig, lookup: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    apply_env_overrides(&mut config, lookup);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Overlay secrets from the environment. Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(key) = read(REGISTRY_API_KEY_ENV_VAR) {
        config.registry.accelerator_api_key = Some(key);
    }
    if let Some(secret) = read(BROKER_SECRET_ENV_VAR) {
        config.credentials.broker_secret = Some(secret);
    }
    if let Some(secret) = read(WEBHOOK_SECRET_ENV_VAR) {
        config.server.webhook_secret = Some(secret);
    }
    if let Some(key) = read(FISCAL_API_KEY_ENV_VAR) {
        config.fiscal.api_key = Some(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides_fill_secrets() {
        let mut config = GatewayConfig::default();
        apply_env_overrides(&mut config, |name| match name {
            REGISTRY_API_KEY_ENV_VAR => Some("reg-key".to_string()),
            WEBHOOK_SECRET_ENV_VAR => Some("   ".to_string()),
            _ => None,
        });

        assert_eq!(config.registry.accelerator_api_key.as_deref(), Some("reg-key"));
        assert!(config.server.webhook_secret.is_none());
        assert!(config.credentials.broker_secret.is_none());
    }

    #[test]
    fn test_defaults_get_env_secrets_and_validation() {
        let config = prepare_config(GatewayConfig::default(), |name| match name {
            WEBHOOK_SECRET_ENV_VAR => Some("hook-secret".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.server.webhook_secret.as_deref(), Some("hook-secret"));

        let mut broken = GatewayConfig::default();
        broken.batch.concurrency = 0;
        let err = prepare_config(broken, |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
    }

    #[test]
    fn test_parse_reports_validation_errors() {
        let err = parse_config(
            r#"
            [retries]
            max_attempts = 0

            [batch]
            concurrency = 0
            "#,
        )
        .unwrap_err();

        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, "[cache]\nnegative_ttl_secs = 600\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.cache.negative_ttl_secs, 600);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
