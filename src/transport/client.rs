//! HTTP transport client with deadline enforcement.
//!
//! # Responsibilities
//! - Execute one request against an external authority
//! - Enforce the per-request deadline (default or override)
//! - Classify failures into `TransportError`
//! - Negotiate the payload shape from `Content-Type`

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};

use crate::config::TransportConfig;
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;
use crate::transport::types::{IntegrationRequest, Payload, RequestBody, TransportError};

/// Shared outbound HTTP client. Cheap to clone.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl HttpTransport {
    /// Build a transport from configuration.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::Network {
                endpoint: "client-builder".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self::with_client(
            client,
            Duration::from_millis(config.request_timeout_ms),
        ))
    }

    /// Wrap an existing reqwest client.
    pub fn with_client(client: reqwest::Client, default_timeout: Duration) -> Self {
        Self {
            client,
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Execute a single request. No retries happen here.
    pub async fn execute(&self, request: &IntegrationRequest) -> Result<Payload, TransportError> {
        let deadline = request.timeout.unwrap_or(self.default_timeout);
        let endpoint = request.endpoint();
        let start = Instant::now();

        let result = with_deadline(&endpoint, deadline, self.send(request, &endpoint, deadline)).await;

        match &result {
            Ok(_) => metrics::record_request(request.integration, "success", start),
            Err(e) => {
                tracing::debug!(
                    integration = request.integration,
                    endpoint = %endpoint,
                    kind = e.kind().as_str(),
                    error = %e,
                    "Integration call failed"
                );
                metrics::record_request(request.integration, e.kind().as_str(), start);
            }
        }

        result
    }

    async fn send(
        &self,
        request: &IntegrationRequest,
        endpoint: &str,
        deadline: Duration,
    ) -> Result<Payload, TransportError> {
        let mut builder = self.client.request(request.method.clone(), &request.url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Form(pairs)) => builder.form(pairs),
            Some(RequestBody::Bytes { content_type, data }) => builder
                .header(CONTENT_TYPE, content_type.as_str())
                .body(data.clone()),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| classify_reqwest(endpoint, deadline, e))?;

        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers());
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase);

        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest(endpoint, deadline, e))?;

        if let Some(err) = TransportError::from_status(endpoint, status, retry_after, &body) {
            return Err(err);
        }

        negotiate(endpoint, content_type.as_deref(), body)
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

/// Pick the payload shape from the declared content type.
fn negotiate(
    endpoint: &str,
    content_type: Option<&str>,
    body: String,
) -> Result<Payload, TransportError> {
    if body.trim().is_empty() {
        return Ok(Payload::Empty);
    }

    match content_type {
        Some(ct) if ct.contains("json") => serde_json::from_str(&body)
            .map(Payload::Json)
            .map_err(|e| TransportError::InvalidResponse {
                endpoint: endpoint.to_string(),
                message: format!("malformed JSON body: {}", e),
            }),
        _ => Ok(Payload::Text(body)),
    }
}

fn classify_reqwest(endpoint: &str, deadline: Duration, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            endpoint: endpoint.to_string(),
            after: deadline,
        }
    } else {
        TransportError::Network {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        }
    }
}

/// Only the delta-seconds form of `Retry-After` is honoured.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
