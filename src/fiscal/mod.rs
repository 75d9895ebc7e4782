//! Fiscal-document authority.
//!
//! # Responsibilities
//! - Submit, cancel and correct documents through the shared retry policy
//! - Track contingency mode and tag documents issued during an outage
//! - Probe authority reachability in the background
//!
//! # Design Decisions
//! - Contingency is state, not an error: issuance keeps working while active
//! - Contingency history is persisted through [`ContingencyStore`]

pub mod client;
pub mod contingency;
pub mod monitor;
pub mod store;
pub mod types;

pub use client::FiscalClient;
pub use contingency::ContingencyStateMachine;
pub use monitor::{AuthorityHealth, FiscalStatusMonitor};
pub use store::{ContingencyStore, FileContingencyStore, MemoryContingencyStore};
pub use types::{
    CancellationReceipt, ContingencyRecord, ContingencyState, ContingencyType, CorrectionReceipt,
    FiscalDocument, IssueStatus, IssuedDocument, ServiceStatus, Transition,
};
