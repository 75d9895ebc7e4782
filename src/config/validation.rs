//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, attempts >= 1, ratios in range)
//! - Validate URLs and addresses of enabled integrations
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: GatewayConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{CredentialStoreKind, GatewayConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("{field} is required when {section} is enabled")]
    Missing {
        field: &'static str,
        section: &'static str,
    },
}

/// Longest refresh-ahead buffer accepted, one day.
pub const MAX_REFRESH_BUFFER_MINUTES: i64 = 24 * 60;
/// Longest cancellation window accepted, one year.
pub const MAX_CANCEL_WINDOW_HOURS: i64 = 365 * 24;

fn invalid(field: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if let Err(e) = Url::parse(value) {
        errors.push(invalid(field, format!("'{}' is not a valid URL ({})", value, e)));
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.transport.request_timeout_ms == 0 {
        errors.push(invalid("transport.request_timeout_ms", "must be greater than 0"));
    }
    if config.transport.connect_timeout_ms == 0 {
        errors.push(invalid("transport.connect_timeout_ms", "must be greater than 0"));
    }

    if config.retries.max_attempts == 0 {
        errors.push(invalid("retries.max_attempts", "must be at least 1"));
    }
    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(invalid(
            "retries.base_delay_ms",
            "must not exceed retries.max_delay_ms",
        ));
    }
    if !(0.0..=1.0).contains(&config.retries.jitter_ratio) {
        errors.push(invalid("retries.jitter_ratio", "must be between 0.0 and 1.0"));
    }

    if config.cache.positive_ttl_secs == 0 {
        errors.push(invalid("cache.positive_ttl_secs", "must be greater than 0"));
    }
    if config.cache.sweep_interval_secs == 0 {
        errors.push(invalid("cache.sweep_interval_secs", "must be greater than 0"));
    }

    if config.batch.concurrency == 0 {
        errors.push(invalid("batch.concurrency", "must be at least 1"));
    }

    if config.registry.enabled {
        check_url(&mut errors, "registry.public_url", &config.registry.public_url);
        if config.registry.accelerator_api_key.is_some() {
            check_url(&mut errors, "registry.accelerator_url", &config.registry.accelerator_url);
        }
    }

    if !(0..=MAX_REFRESH_BUFFER_MINUTES).contains(&config.credentials.refresh_buffer_minutes) {
        errors.push(invalid(
            "credentials.refresh_buffer_minutes",
            format!("must be between 0 and {}", MAX_REFRESH_BUFFER_MINUTES),
        ));
    }

    if config.groupware.enabled
        || config.banking.enabled
        || config.credentials.store == CredentialStoreKind::Broker
    {
        check_url(&mut errors, "credentials.broker_url", &config.credentials.broker_url);
    }

    if config.groupware.enabled {
        check_url(&mut errors, "groupware.api_url", &config.groupware.api_url);
        check_url(&mut errors, "groupware.authorize_url", &config.groupware.authorize_url);
        if config.groupware.client_id.trim().is_empty() {
            errors.push(ValidationError::Missing {
                field: "groupware.client_id",
                section: "groupware",
            });
        }
    }

    if config.banking.enabled {
        check_url(&mut errors, "banking.api_url", &config.banking.api_url);
        if config.banking.page_size == 0 {
            errors.push(invalid("banking.page_size", "must be greater than 0"));
        }
    }

    if config.fiscal.enabled {
        check_url(&mut errors, "fiscal.api_url", &config.fiscal.api_url);
        if !(1..=MAX_CANCEL_WINDOW_HOURS).contains(&config.fiscal.cancel_window_hours) {
            errors.push(invalid(
                "fiscal.cancel_window_hours",
                format!("must be between 1 and {}", MAX_CANCEL_WINDOW_HOURS),
            ));
        }
        if config.fiscal.probe_interval_secs == 0 {
            errors.push(invalid("fiscal.probe_interval_secs", "must be greater than 0"));
        }
        if config.fiscal.owner.trim().is_empty() {
            errors.push(ValidationError::Missing {
                field: "fiscal.owner",
                section: "fiscal",
            });
        }
    }

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(invalid(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(invalid(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_all_errors_are_reported() {
        let mut config = GatewayConfig::default();
        config.retries.max_attempts = 0;
        config.retries.jitter_ratio = 2.0;
        config.server.bind_address = "nowhere".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_durations_are_bounded() {
        let mut config = GatewayConfig::default();
        config.credentials.refresh_buffer_minutes = i64::MAX;
        config.fiscal.enabled = true;
        config.fiscal.cancel_window_hours = i64::MAX;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors
            .iter()
            .filter_map(|e| match e {
                ValidationError::InvalidValue { field, .. } => Some(*field),
                _ => None,
            })
            .collect();
        assert!(fields.contains(&"credentials.refresh_buffer_minutes"));
        assert!(fields.contains(&"fiscal.cancel_window_hours"));

        config.credentials.refresh_buffer_minutes = MAX_REFRESH_BUFFER_MINUTES;
        config.fiscal.cancel_window_hours = MAX_CANCEL_WINDOW_HOURS;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_enabled_integrations_need_urls() {
        let mut config = GatewayConfig::default();
        config.groupware.enabled = true;
        config.groupware.api_url = "not a url".into();

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::Missing {
            field: "groupware.client_id",
            section: "groupware",
        }));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidValue { field: "groupware.api_url", .. })));
    }
}
