//! Fiscal document and contingency types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Contingency modes accepted by the fiscal authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContingencyType {
    /// Virtual authorization server, national environment.
    #[serde(rename = "SVC-AN")]
    SvcAn,
    /// Virtual authorization server, southern environment.
    #[serde(rename = "SVC-RS")]
    SvcRs,
    /// Prior electronic event registration.
    #[serde(rename = "EPEC")]
    Epec,
    /// Security form printed on paper.
    #[serde(rename = "FS-DA")]
    FsDa,
    /// Issued offline, transmitted later.
    #[serde(rename = "OFFLINE")]
    Offline,
}

impl ContingencyType {
    pub const ALL: [ContingencyType; 5] = [
        ContingencyType::SvcAn,
        ContingencyType::SvcRs,
        ContingencyType::Epec,
        ContingencyType::FsDa,
        ContingencyType::Offline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContingencyType::SvcAn => "SVC-AN",
            ContingencyType::SvcRs => "SVC-RS",
            ContingencyType::Epec => "EPEC",
            ContingencyType::FsDa => "FS-DA",
            ContingencyType::Offline => "OFFLINE",
        }
    }
}

impl fmt::Display for ContingencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContingencyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| format!("unknown contingency type '{}'", s))
    }
}

/// One contingency period. `ended_at` is set when it is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContingencyRecord {
    pub id: Uuid,
    pub owner: String,
    pub kind: ContingencyType,
    pub reason: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ContingencyRecord {
    pub fn open(owner: impl Into<String>, kind: ContingencyType, reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            kind,
            reason: reason.into(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Current contingency state of one owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "type", rename_all = "snake_case")]
pub enum ContingencyState {
    Normal,
    Contingency(ContingencyType),
}

impl ContingencyState {
    pub fn active_type(&self) -> Option<ContingencyType> {
        match self {
            ContingencyState::Normal => None,
            ContingencyState::Contingency(kind) => Some(*kind),
        }
    }
}

/// Result of an `enable` or `disable` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Entered(ContingencyRecord),
    Exited(ContingencyRecord),
    /// The call did not apply in the current state.
    Ignored(ContingencyState),
}

impl Transition {
    pub fn is_ignored(&self) -> bool {
        matches!(self, Transition::Ignored(_))
    }
}

/// Document handed to the fiscal authority. The body is opaque to this layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiscalDocument {
    /// Caller-side reference, used to reconcile documents issued in contingency.
    pub reference: String,
    pub body: serde_json::Value,
}

/// Authority-side processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Authorized,
    Processing,
    /// Issued in contingency; must be transmitted once the authority is back.
    PendingTransmission,
}

/// Outcome of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedDocument {
    pub reference: String,
    pub access_key: Option<String>,
    pub status: IssueStatus,
    pub contingency: Option<ContingencyType>,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationReceipt {
    pub access_key: String,
    pub protocol: Option<String>,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionReceipt {
    pub access_key: String,
    pub sequence: u8,
    pub protocol: Option<String>,
}

/// Reachability of the authority as seen by one probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub online: bool,
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}
