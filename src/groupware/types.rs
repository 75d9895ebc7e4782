//! Groupware request and response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{IntegrationError, IntegrationResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailMessage {
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub html: bool,
}

fn recipients(addresses: &[String]) -> Vec<Value> {
    addresses
        .iter()
        .map(|address| json!({ "emailAddress": { "address": address } }))
        .collect()
}

impl MailMessage {
    pub fn validate(&self) -> IntegrationResult<()> {
        if self.to.is_empty() {
            return Err(IntegrationError::InvalidInput("mail has no recipients".into()));
        }
        if let Some(bad) = self.to.iter().chain(&self.cc).find(|a| !a.contains('@')) {
            return Err(IntegrationError::InvalidInput(format!("invalid recipient '{}'", bad)));
        }
        Ok(())
    }

    pub(crate) fn to_wire(&self) -> Value {
        json!({
            "message": {
                "subject": self.subject,
                "body": {
                    "contentType": if self.html { "HTML" } else { "Text" },
                    "content": self.body,
                },
                "toRecipients": recipients(&self.to),
                "ccRecipients": recipients(&self.cc),
            },
            "saveToSentItems": true,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub subject: String,
    #[serde(default)]
    pub body: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Ask the provider to attach an online meeting to the event.
    #[serde(default)]
    pub online_meeting: bool,
}

fn check_span(start: DateTime<Utc>, end: DateTime<Utc>) -> IntegrationResult<()> {
    if end <= start {
        return Err(IntegrationError::InvalidInput(format!(
            "end {} is not after start {}",
            end, start
        )));
    }
    Ok(())
}

fn wire_time(t: DateTime<Utc>) -> Value {
    json!({ "dateTime": t.format("%Y-%m-%dT%H:%M:%S").to_string(), "timeZone": "UTC" })
}

impl CalendarEvent {
    pub fn validate(&self) -> IntegrationResult<()> {
        check_span(self.start, self.end)
    }

    pub(crate) fn to_wire(&self) -> Value {
        let attendees: Vec<Value> = self
            .attendees
            .iter()
            .map(|address| json!({ "emailAddress": { "address": address }, "type": "required" }))
            .collect();

        let mut wire = json!({
            "subject": self.subject,
            "start": wire_time(self.start),
            "end": wire_time(self.end),
            "attendees": attendees,
            "isOnlineMeeting": self.online_meeting,
        });
        if let Some(body) = &self.body {
            wire["body"] = json!({ "contentType": "Text", "content": body });
        }
        if let Some(location) = &self.location {
            wire["location"] = json!({ "displayName": location });
        }
        wire
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEvent {
    pub id: String,
    #[serde(default)]
    pub web_link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingRequest {
    pub subject: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MeetingRequest {
    pub fn validate(&self) -> IntegrationResult<()> {
        check_span(self.start, self.end)
    }

    pub(crate) fn to_wire(&self) -> Value {
        json!({
            "subject": self.subject,
            "startDateTime": self.start.to_rfc3339(),
            "endDateTime": self.end.to_rfc3339(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineMeeting {
    pub id: String,
    pub join_web_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_mail_validation() {
        let mut mail = MailMessage {
            subject: "Hi".into(),
            body: "Body".into(),
            ..Default::default()
        };
        assert!(mail.validate().is_err());

        mail.to = vec!["ana@example.com".into()];
        assert!(mail.validate().is_ok());

        mail.cc = vec!["nobody".into()];
        assert!(mail.validate().is_err());
    }

    #[test]
    fn test_mail_wire_shape() {
        let mail = MailMessage {
            to: vec!["ana@example.com".into()],
            subject: "Invoice".into(),
            body: "<b>Paid</b>".into(),
            html: true,
            ..Default::default()
        };
        let wire = mail.to_wire();
        assert_eq!(wire["message"]["body"]["contentType"], "HTML");
        assert_eq!(wire["message"]["toRecipients"][0]["emailAddress"]["address"], "ana@example.com");
    }

    #[test]
    fn test_event_span_must_be_positive() {
        let start = Utc::now();
        let event = CalendarEvent {
            subject: "Review".into(),
            body: None,
            start,
            end: start - Duration::minutes(30),
            attendees: vec![],
            location: Some("Room 1".into()),
            online_meeting: false,
        };
        assert!(event.validate().is_err());
        assert_eq!(event.to_wire()["location"]["displayName"], "Room 1");
    }
}
