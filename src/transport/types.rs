//! Request, payload and error types shared by every integration.

use std::fmt;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::error::{IntegrationError, IntegrationResult};

/// Longest slice of an error body kept in error messages.
const MAX_ERROR_BODY: usize = 512;

/// Body of an outbound request.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// JSON document.
    Json(serde_json::Value),
    /// `application/x-www-form-urlencoded` pairs.
    Form(Vec<(String, String)>),
    /// Raw bytes with an explicit content type (file uploads).
    Bytes { content_type: String, data: Vec<u8> },
}

/// A single outbound call to an external authority.
#[derive(Clone)]
pub struct IntegrationRequest {
    /// Integration label used for metrics and error context.
    pub integration: &'static str,
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub bearer: Option<String>,
    pub body: Option<RequestBody>,
    /// Overrides the transport's default deadline.
    pub timeout: Option<Duration>,
}

impl IntegrationRequest {
    pub fn new(integration: &'static str, method: Method, url: impl Into<String>) -> Self {
        Self {
            integration,
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            bearer: None,
            body: None,
            timeout: None,
        }
    }

    pub fn get(integration: &'static str, url: impl Into<String>) -> Self {
        Self::new(integration, Method::GET, url)
    }

    pub fn post(integration: &'static str, url: impl Into<String>) -> Self {
        Self::new(integration, Method::POST, url)
    }

    pub fn put(integration: &'static str, url: impl Into<String>) -> Self {
        Self::new(integration, Method::PUT, url)
    }

    pub fn delete(integration: &'static str, url: impl Into<String>) -> Self {
        Self::new(integration, Method::DELETE, url)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn form(mut self, pairs: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(pairs));
        self
    }

    pub fn bytes(mut self, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        self.body = Some(RequestBody::Bytes {
            content_type: content_type.into(),
            data,
        });
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `METHOD url` without the query string, safe for logs.
    pub fn endpoint(&self) -> String {
        let path = self.url.split('?').next().unwrap_or(&self.url);
        format!("{} {}", self.method, path)
    }
}

// Header values and bearer tokens carry secrets; only names are printed.
impl fmt::Debug for IntegrationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("IntegrationRequest")
            .field("integration", &self.integration)
            .field("endpoint", &self.endpoint())
            .field("headers", &header_names)
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .field("has_body", &self.body.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Response body, shaped by the response `Content-Type`.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(serde_json::Value),
    Text(String),
    Empty,
}

impl Payload {
    /// Deserialize the payload into `T`.
    ///
    /// Text payloads are parsed as JSON too: several authorities answer JSON
    /// with a `text/plain` content type.
    pub fn into_json<T: DeserializeOwned>(self, endpoint: &str) -> Result<T, TransportError> {
        let parsed = match self {
            Payload::Json(value) => serde_json::from_value(value),
            Payload::Text(text) => serde_json::from_str(&text),
            Payload::Empty => serde_json::from_value(serde_json::Value::Null),
        };
        parsed.map_err(|e| TransportError::InvalidResponse {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }
}

/// Classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Client,
    RateLimited,
    Server,
    Network,
    Timeout,
    InvalidResponse,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Client => "client_error",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Server => "server_error",
            ErrorKind::Network => "network_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidResponse => "invalid_response",
        }
    }
}

/// Errors produced by a single transport call.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// 4xx other than 429: the request itself is wrong.
    #[error("client error {status} from {endpoint}: {message}")]
    Client {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// 429 Too Many Requests.
    #[error("rate limited by {endpoint}")]
    RateLimited {
        endpoint: String,
        retry_after: Option<Duration>,
    },

    /// 5xx.
    #[error("server error {status} from {endpoint}: {message}")]
    Server {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// Connection-level failure (DNS, refused, reset, TLS).
    #[error("network error calling {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    /// Deadline exceeded.
    #[error("{endpoint} timed out after {after:?}")]
    Timeout { endpoint: String, after: Duration },

    /// Body did not match the declared or expected shape.
    #[error("invalid response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },
}

impl TransportError {
    /// Map a non-success HTTP status to an error. Returns `None` for 1xx-3xx.
    pub fn from_status(
        endpoint: &str,
        status: u16,
        retry_after: Option<Duration>,
        body: &str,
    ) -> Option<Self> {
        let endpoint = endpoint.to_string();
        match status {
            429 => Some(TransportError::RateLimited {
                endpoint,
                retry_after,
            }),
            400..=499 => Some(TransportError::Client {
                endpoint,
                status,
                message: truncate(body),
            }),
            500..=599 => Some(TransportError::Server {
                endpoint,
                status,
                message: truncate(body),
            }),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Client { .. } => ErrorKind::Client,
            TransportError::RateLimited { .. } => ErrorKind::RateLimited,
            TransportError::Server { .. } => ErrorKind::Server,
            TransportError::Network { .. } => ErrorKind::Network,
            TransportError::Timeout { .. } => ErrorKind::Timeout,
            TransportError::InvalidResponse { .. } => ErrorKind::InvalidResponse,
        }
    }

    /// True for failures worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateLimited | ErrorKind::Server | ErrorKind::Network | ErrorKind::Timeout
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Client { status, .. } | TransportError::Server { status, .. } => {
                Some(*status)
            }
            TransportError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            TransportError::Client { endpoint, .. }
            | TransportError::RateLimited { endpoint, .. }
            | TransportError::Server { endpoint, .. }
            | TransportError::Network { endpoint, .. }
            | TransportError::Timeout { endpoint, .. }
            | TransportError::InvalidResponse { endpoint, .. } => endpoint,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TransportError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Append `segments` to `base`, percent-encoding each one, so caller data
/// such as an id containing `/` or `?` stays a single path segment.
pub fn endpoint_url(base: &str, segments: &[&str]) -> IntegrationResult<String> {
    if let Some(bad) = segments
        .iter()
        .find(|s| s.trim().is_empty() || **s == "." || **s == "..")
    {
        return Err(IntegrationError::InvalidInput(format!("invalid path segment {:?}", bad)));
    }

    let mut url = Url::parse(base).map_err(|e| IntegrationError::InvalidInput(format!("api url {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| IntegrationError::InvalidInput(format!("api url {} cannot be a base", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url.into())
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
