//! Shared utilities for integration testing against mocked authorities.

#![allow(dead_code)]

use std::time::Duration;

use integration_gateway::config::{GatewayConfig, TransportConfig};
use integration_gateway::resilience::RetryPolicy;
use integration_gateway::transport::HttpTransport;

/// Retry policy with millisecond backoff so tests stay fast.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(5), Duration::from_millis(20))
}

pub fn transport() -> HttpTransport {
    let config = TransportConfig {
        request_timeout_ms: 2_000,
        connect_timeout_ms: 500,
        ..TransportConfig::default()
    };
    HttpTransport::new(&config).unwrap()
}

/// Gateway config with fast retries and no batch pacing.
pub fn fast_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.transport.request_timeout_ms = 2_000;
    config.transport.connect_timeout_ms = 500;
    config.retries.max_attempts = 3;
    config.retries.base_delay_ms = 5;
    config.retries.max_delay_ms = 20;
    config.batch.pacing_ms = 0;
    config
}
