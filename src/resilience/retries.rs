//! Retry logic.
//!
//! # Responsibilities
//! - Classify each failure as retryable or terminal
//! - Execute retries with exponential backoff
//! - Report exhaustion distinctly from terminal failures
//!
//! # Design Decisions
//! - Never retry client errors (the request itself is wrong)
//! - `Retry-After` from a 429 raises the delay but never past the cap
//! - The attempt counter is local to each call

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::transport::types::{ErrorKind, IntegrationRequest, Payload, TransportError};
use crate::transport::HttpTransport;

/// What to do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the computed backoff.
    Retry,
    /// Retry, waiting at least this long.
    RetryAfter(Duration),
    /// Give up immediately.
    Stop,
}

/// Outcome of a retried operation that did not succeed.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The classifier declared the error non-retryable.
    #[error("{0}")]
    Terminal(E),

    /// Every attempt failed with a retryable error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Terminal(_) => 1,
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Terminal(e) => e,
            RetryError::Exhausted { last, .. } => last,
        }
    }

    pub fn inner(&self) -> &E {
        match self {
            RetryError::Terminal(e) => e,
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

/// Classifier for transport failures.
pub fn transport_classifier(err: &TransportError) -> RetryDecision {
    match err.kind() {
        ErrorKind::RateLimited => err
            .retry_after()
            .map_or(RetryDecision::Retry, RetryDecision::RetryAfter),
        ErrorKind::Server | ErrorKind::Network | ErrorKind::Timeout => RetryDecision::Retry,
        ErrorKind::Client | ErrorKind::InvalidResponse => RetryDecision::Stop,
    }
}

/// Retry policy shared by every integration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_ratio: f64,
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; values below 1 are raised to 1.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter_ratio: 0.0,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
        .with_jitter(config.jitter_ratio)
    }

    pub fn with_jitter(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff after the failed zero-based `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff(
            attempt,
            self.base_delay.as_millis() as u64,
            self.max_delay.as_millis() as u64,
            self.jitter_ratio,
        )
    }

    /// Run `operation` until it succeeds, fails terminally, or attempts run out.
    pub async fn run<T, E, F, Fut, C>(
        &self,
        label: &str,
        classifier: C,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> RetryDecision,
        E: fmt::Display,
    {
        let mut attempt = 0u32;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let delay = match classifier(&err) {
                RetryDecision::Stop => return Err(RetryError::Terminal(err)),
                RetryDecision::Retry => self.delay_for(attempt),
                RetryDecision::RetryAfter(hint) => self.delay_for(attempt).max(hint).min(self.max_delay),
            };

            attempt += 1;
            if attempt >= self.max_attempts {
                tracing::warn!(
                    operation = label,
                    attempts = attempt,
                    error = %err,
                    "Retry attempts exhausted"
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            tracing::debug!(
                operation = label,
                attempt = attempt,
                delay = ?delay,
                error = %err,
                "Retrying after transient failure"
            );
            metrics::record_retry(label);
            tokio::time::sleep(delay).await;
        }
    }

    /// Execute one HTTP request under this policy.
    pub async fn execute(
        &self,
        transport: &HttpTransport,
        request: &IntegrationRequest,
    ) -> Result<Payload, RetryError<TransportError>> {
        self.run(request.integration, transport_classifier, || transport.execute(request))
            .await
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::from_config(config)
    }
}
