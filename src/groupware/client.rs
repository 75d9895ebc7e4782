//! Groupware provider client.
//!
//! Every call first obtains a valid credential from the [`CredentialManager`];
//! a 401 from the provider surfaces as `AuthExpired`.

use std::sync::Arc;

use crate::config::GroupwareConfig;
use crate::credentials::CredentialManager;
use crate::error::{IntegrationError, IntegrationResult};
use crate::groupware::types::{
    CalendarEvent, CreatedEvent, MailMessage, MeetingRequest, OnlineMeeting, UploadedFile,
};
use crate::resilience::{RetryError, RetryPolicy};
use crate::transport::types::{endpoint_url, IntegrationRequest, Payload};
use crate::transport::HttpTransport;

const INTEGRATION: &str = "groupware";

pub struct GroupwareClient {
    transport: HttpTransport,
    retry: RetryPolicy,
    base_url: String,
    credentials: Arc<CredentialManager>,
}

impl GroupwareClient {
    pub fn new(
        config: &GroupwareConfig,
        transport: HttpTransport,
        retry: RetryPolicy,
        credentials: Arc<CredentialManager>,
    ) -> Self {
        Self {
            transport,
            retry,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    fn url(&self, segments: &[&str]) -> IntegrationResult<String> {
        endpoint_url(&self.base_url, segments)
    }

    async fn send(&self, request: IntegrationRequest) -> IntegrationResult<Payload> {
        let token = self.credentials.access_token().await?;
        let request = request.bearer(token);

        match self.retry.execute(&self.transport, &request).await {
            Ok(payload) => Ok(payload),
            Err(RetryError::Terminal(e)) if e.status() == Some(401) => {
                let account = self.credentials.account();
                tracing::warn!(account = %account, endpoint = %e.endpoint(), "Groupware rejected the access token");
                Err(IntegrationError::AuthExpired {
                    account,
                    reason: "provider rejected the access token".to_string(),
                })
            }
            Err(e) => Err(IntegrationError::from_retry(INTEGRATION, e)),
        }
    }

    async fn send_json<T: serde::de::DeserializeOwned>(&self, request: IntegrationRequest) -> IntegrationResult<T> {
        let endpoint = request.endpoint();
        self.send(request)
            .await?
            .into_json(&endpoint)
            .map_err(|e| IntegrationError::from_transport(INTEGRATION, e))
    }

    pub async fn send_mail(&self, message: &MailMessage) -> IntegrationResult<()> {
        message.validate()?;
        let request = IntegrationRequest::post(INTEGRATION, self.url(&["me", "sendMail"])?).json(message.to_wire());
        self.send(request).await?;
        tracing::info!(recipients = message.to.len() + message.cc.len(), "Mail sent");
        Ok(())
    }

    pub async fn create_event(&self, event: &CalendarEvent) -> IntegrationResult<CreatedEvent> {
        event.validate()?;
        let request = IntegrationRequest::post(INTEGRATION, self.url(&["me", "events"])?).json(event.to_wire());
        let created: CreatedEvent = self.send_json(request).await?;
        tracing::info!(event_id = %created.id, "Calendar event created");
        Ok(created)
    }

    pub async fn create_meeting(&self, meeting: &MeetingRequest) -> IntegrationResult<OnlineMeeting> {
        meeting.validate()?;
        let request =
            IntegrationRequest::post(INTEGRATION, self.url(&["me", "onlineMeetings"])?).json(meeting.to_wire());
        self.send_json(request).await
    }

    /// Upload `data` to `path` in the user's drive, replacing any existing file.
    pub async fn upload_file(&self, path: &str, content_type: &str, data: Vec<u8>) -> IntegrationResult<UploadedFile> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((file_name, folders)) = parts.split_last() else {
            return Err(IntegrationError::InvalidInput("upload path is empty".into()));
        };
        if parts.iter().any(|p| *p == "." || *p == "..") {
            return Err(IntegrationError::InvalidInput(format!("upload path '{}' is not canonical", path)));
        }

        // `root:/a/b/file.txt:/content` addressing.
        let last = format!("{}:", file_name);
        let mut segments = vec!["me", "drive", "root:"];
        segments.extend_from_slice(folders);
        segments.push(&last);
        segments.push("content");

        let request = IntegrationRequest::put(INTEGRATION, self.url(&segments)?).bytes(content_type, data);
        let uploaded: UploadedFile = self.send_json(request).await?;
        tracing::info!(file_id = %uploaded.id, name = %uploaded.name, "File uploaded");
        Ok(uploaded)
    }
}

impl std::fmt::Debug for GroupwareClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupwareClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}
