//! Open-banking aggregator.
//!
//! # Responsibilities
//! - Obtain connect tokens and API keys through the broker
//! - Poll connection status, list accounts and paginated transactions
//! - Translate inbound webhooks into re-sync, status and removal actions

pub mod client;
pub mod types;
pub mod webhooks;

pub use client::BankingClient;
pub use types::{Account, ConnectionStatus, DateRange, Item, ItemStatus, Transaction};
pub use webhooks::{
    BankingSink, ConnectionSnapshot, SnapshotSink, WebhookAction, WebhookDispatcher, WebhookEvent, WebhookEventKind,
};
