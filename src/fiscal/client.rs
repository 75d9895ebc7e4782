//! Fiscal-document authority client.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::config::validation::MAX_CANCEL_WINDOW_HOURS;
use crate::config::FiscalConfig;
use crate::error::{IntegrationError, IntegrationResult};
use crate::fiscal::contingency::ContingencyStateMachine;
use crate::fiscal::types::{
    CancellationReceipt, CorrectionReceipt, FiscalDocument, IssueStatus, IssuedDocument, ServiceStatus,
};
use crate::resilience::RetryPolicy;
use crate::transport::types::{endpoint_url, IntegrationRequest};
use crate::transport::HttpTransport;

const INTEGRATION: &str = "fiscal";

/// Valid correction-letter sequence numbers.
pub const CORRECTION_SEQUENCE: std::ops::RangeInclusive<u8> = 1..=20;

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    access_key: Option<String>,
    status: IssueStatus,
    #[serde(default)]
    issued_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ProtocolResponse {
    #[serde(default)]
    protocol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    online: bool,
    #[serde(default)]
    message: Option<String>,
}

pub struct FiscalClient {
    transport: HttpTransport,
    retry: RetryPolicy,
    base_url: String,
    api_key: Option<String>,
    cancel_window: chrono::Duration,
    probe_timeout: Duration,
    contingency: Arc<ContingencyStateMachine>,
}

impl FiscalClient {
    pub fn new(
        config: &FiscalConfig,
        transport: HttpTransport,
        retry: RetryPolicy,
        contingency: Arc<ContingencyStateMachine>,
    ) -> Self {
        Self {
            transport,
            retry,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            cancel_window: chrono::Duration::try_hours(config.cancel_window_hours.clamp(1, MAX_CANCEL_WINDOW_HOURS))
                .unwrap_or(chrono::Duration::zero()),
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
            contingency,
        }
    }

    pub fn contingency(&self) -> &Arc<ContingencyStateMachine> {
        &self.contingency
    }

    fn request(&self, request: IntegrationRequest) -> IntegrationRequest {
        match &self.api_key {
            Some(key) => request.bearer(key.clone()),
            None => request,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, request: IntegrationRequest) -> IntegrationResult<T> {
        let endpoint = request.endpoint();
        self.retry
            .execute(&self.transport, &request)
            .await
            .map_err(|e| IntegrationError::from_retry(INTEGRATION, e))?
            .into_json(&endpoint)
            .map_err(|e| IntegrationError::from_transport(INTEGRATION, e))
    }

    /// Submit a document. In contingency it is tagged locally and not sent.
    pub async fn submit(&self, document: &FiscalDocument) -> IntegrationResult<IssuedDocument> {
        if document.reference.trim().is_empty() {
            return Err(IntegrationError::InvalidInput("document reference is empty".into()));
        }

        if let Some(kind) = self.contingency.active_type() {
            tracing::info!(reference = %document.reference, contingency = %kind, "Document issued in contingency");
            return Ok(IssuedDocument {
                reference: document.reference.clone(),
                access_key: None,
                status: IssueStatus::PendingTransmission,
                contingency: Some(kind),
                issued_at: Utc::now(),
            });
        }

        let request = self.request(
            IntegrationRequest::post(INTEGRATION, format!("{}/documents", self.base_url))
                .header("Idempotency-Key", document.reference.clone())
                .json(json!({ "reference": document.reference, "document": document.body })),
        );
        let response: SubmitResponse = self.send(request).await?;

        tracing::info!(reference = %document.reference, status = ?response.status, "Document submitted");
        Ok(IssuedDocument {
            reference: document.reference.clone(),
            access_key: response.access_key,
            status: response.status,
            contingency: None,
            issued_at: response.issued_at.unwrap_or_else(Utc::now),
        })
    }

    /// Cancel an issued document within the configured window.
    pub async fn cancel(&self, document: &IssuedDocument, justification: &str) -> IntegrationResult<CancellationReceipt> {
        let Some(access_key) = document.access_key.as_deref() else {
            return Err(IntegrationError::InvalidInput(format!(
                "document {} has no access key",
                document.reference
            )));
        };
        if justification.trim().is_empty() {
            return Err(IntegrationError::InvalidInput("cancellation justification is empty".into()));
        }

        self.check_cancel_window(access_key, document.issued_at, Utc::now())?;

        let request = self.request(
            IntegrationRequest::post(
                INTEGRATION,
                endpoint_url(&self.base_url, &["documents", access_key, "cancellation"])?,
            )
            .json(json!({ "justification": justification })),
        );
        let response: ProtocolResponse = self.send(request).await?;

        tracing::info!(access_key, "Document cancelled");
        Ok(CancellationReceipt {
            access_key: access_key.to_string(),
            protocol: response.protocol,
            cancelled_at: Utc::now(),
        })
    }

    fn check_cancel_window(&self, access_key: &str, issued_at: DateTime<Utc>, now: DateTime<Utc>) -> IntegrationResult<()> {
        if now - issued_at > self.cancel_window {
            return Err(IntegrationError::CancellationWindowClosed {
                access_key: access_key.to_string(),
                issued_at,
                window_hours: self.cancel_window.num_hours(),
            });
        }
        Ok(())
    }

    /// Issue correction letter number `sequence` (1 to 20).
    pub async fn correction_letter(&self, access_key: &str, sequence: u8, text: &str) -> IntegrationResult<CorrectionReceipt> {
        if !CORRECTION_SEQUENCE.contains(&sequence) {
            return Err(IntegrationError::InvalidInput(format!(
                "correction sequence {} outside {}..={}",
                sequence,
                CORRECTION_SEQUENCE.start(),
                CORRECTION_SEQUENCE.end()
            )));
        }
        if text.trim().is_empty() {
            return Err(IntegrationError::InvalidInput("correction text is empty".into()));
        }

        let request = self.request(
            IntegrationRequest::post(
                INTEGRATION,
                endpoint_url(&self.base_url, &["documents", access_key, "corrections"])?,
            )
            .json(json!({ "sequence": sequence, "text": text })),
        );
        let response: ProtocolResponse = self.send(request).await?;

        Ok(CorrectionReceipt {
            access_key: access_key.to_string(),
            sequence,
            protocol: response.protocol,
        })
    }

    /// Probe the authority once. A transient failure reports it offline.
    pub async fn service_status(&self) -> IntegrationResult<ServiceStatus> {
        let request = self.request(
            IntegrationRequest::get(INTEGRATION, format!("{}/status", self.base_url)).timeout(self.probe_timeout),
        );
        let endpoint = request.endpoint();

        let payload = match self.transport.execute(&request).await {
            Ok(payload) => payload,
            Err(e) if e.is_transient() => {
                tracing::debug!(endpoint = %endpoint, error = %e, "Status probe failed");
                return Ok(ServiceStatus {
                    online: false,
                    message: Some(e.to_string()),
                    checked_at: Utc::now(),
                });
            }
            Err(e) => return Err(IntegrationError::from_transport(INTEGRATION, e)),
        };

        let status: StatusResponse = payload
            .into_json(&endpoint)
            .map_err(|e| IntegrationError::from_transport(INTEGRATION, e))?;
        Ok(ServiceStatus {
            online: status.online,
            message: status.message,
            checked_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiscal::store::MemoryContingencyStore;
    use crate::fiscal::types::ContingencyType;

    async fn client() -> FiscalClient {
        let contingency = ContingencyStateMachine::load("acme", Arc::new(MemoryContingencyStore::new()))
            .await
            .unwrap();
        let config = FiscalConfig {
            // Nothing listens here; tests below must not reach the network.
            api_url: "http://127.0.0.1:9".into(),
            ..Default::default()
        };
        FiscalClient::new(
            &config,
            HttpTransport::with_client(reqwest::Client::new(), Duration::from_millis(200)),
            RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(1)),
            Arc::new(contingency),
        )
    }

    #[tokio::test]
    async fn test_contingency_submission_skips_authority() {
        let client = client().await;
        client
            .contingency()
            .enable(ContingencyType::SvcAn, "service offline")
            .await
            .unwrap();

        let issued = client
            .submit(&FiscalDocument {
                reference: "order-42".into(),
                body: json!({"total": 10}),
            })
            .await
            .unwrap();

        assert_eq!(issued.contingency, Some(ContingencyType::SvcAn));
        assert_eq!(issued.status, IssueStatus::PendingTransmission);
        assert!(issued.access_key.is_none());
    }

    #[tokio::test]
    async fn test_cancel_window() {
        let client = client().await;
        let now = Utc::now();

        assert!(client
            .check_cancel_window("key", now - chrono::Duration::hours(23), now)
            .is_ok());

        let err = client
            .check_cancel_window("key", now - chrono::Duration::hours(25), now)
            .unwrap_err();
        match err {
            IntegrationError::CancellationWindowClosed { window_hours, .. } => assert_eq!(window_hours, 24),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_requires_access_key() {
        let client = client().await;
        let document = IssuedDocument {
            reference: "order-1".into(),
            access_key: None,
            status: IssueStatus::PendingTransmission,
            contingency: Some(ContingencyType::Offline),
            issued_at: Utc::now(),
        };
        let err = client.cancel(&document, "duplicated").await.unwrap_err();
        assert!(matches!(err, IntegrationError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_correction_sequence_bounds() {
        let client = client().await;
        for sequence in [0u8, 21] {
            let err = client.correction_letter("key", sequence, "fix").await.unwrap_err();
            assert!(matches!(err, IntegrationError::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn test_unreachable_authority_reports_offline() {
        let status = client().await.service_status().await.unwrap();
        assert!(!status.online);
    }
}
