//! Metrics collection and exposition.
//!
//! # Metrics
//! - `integration_requests_total` (counter): outbound calls by integration, outcome
//! - `integration_request_duration_seconds` (histogram): outbound latency
//! - `integration_retries_total` (counter): retries by operation
//! - `integration_cache_events_total` (counter): hit / miss / expired by cache
//! - `integration_cache_entries` (gauge): entries per cache
//! - `integration_fallbacks_total` (counter): secondary provider consultations
//! - `integration_credential_refresh_total` (counter): refreshes by outcome
//! - `integration_batch_items_total` (counter): batch items by outcome
//! - `integration_webhooks_total` (counter): inbound webhook events by type
//! - `fiscal_authority_online` (gauge): 1=reachable, 0=unreachable
//! - `fiscal_contingency_active` (gauge): 1=contingency, 0=normal

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(integration: &'static str, outcome: &'static str, start: Instant) {
    counter!("integration_requests_total", "integration" => integration, "outcome" => outcome)
        .increment(1);
    histogram!("integration_request_duration_seconds", "integration" => integration)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_retry(operation: &str) {
    counter!("integration_retries_total", "operation" => operation.to_string()).increment(1);
}

pub fn record_cache_event(cache: &'static str, event: &'static str) {
    counter!("integration_cache_events_total", "cache" => cache, "event" => event).increment(1);
}

pub fn record_cache_size(cache: &'static str, size: usize) {
    gauge!("integration_cache_entries", "cache" => cache).set(size as f64);
}

pub fn record_fallback(integration: &'static str) {
    counter!("integration_fallbacks_total", "integration" => integration).increment(1);
}

pub fn record_credential_refresh(outcome: &'static str) {
    counter!("integration_credential_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_batch_item(outcome: &'static str) {
    counter!("integration_batch_items_total", "outcome" => outcome).increment(1);
}

pub fn record_webhook(event: &str) {
    counter!("integration_webhooks_total", "event" => event.to_string()).increment(1);
}

pub fn record_authority_health(online: bool) {
    gauge!("fiscal_authority_online").set(if online { 1.0 } else { 0.0 });
}

pub fn record_contingency_active(active: bool) {
    gauge!("fiscal_contingency_active").set(if active { 1.0 } else { 0.0 });
}
