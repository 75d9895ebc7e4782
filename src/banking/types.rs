//! Open-banking aggregator types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A bank connection ("item") at the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub status: ItemStatus,
    #[serde(default)]
    pub execution_status: Option<String>,
    #[serde(default)]
    pub connector: Option<Connector>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connector {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Updating,
    Updated,
    LoginError,
    Outdated,
    WaitingUserInput,
    #[serde(other)]
    Unknown,
}

impl ItemStatus {
    /// Connection status implied by the aggregator's item status, `None` when
    /// the status is not one we know.
    pub fn connection_status(self) -> Option<ConnectionStatus> {
        match self {
            ItemStatus::Updating | ItemStatus::Updated => Some(ConnectionStatus::Active),
            ItemStatus::LoginError | ItemStatus::WaitingUserInput => Some(ConnectionStatus::LoginRequired),
            ItemStatus::Outdated => Some(ConnectionStatus::Error),
            ItemStatus::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub subtype: Option<String>,
    pub name: String,
    #[serde(default)]
    pub number: Option<String>,
    pub balance: f64,
    #[serde(default)]
    pub currency_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub description: String,
    pub amount: f64,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// `{ results: [...] }` envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct ResultsPage<T> {
    pub results: Vec<T>,
}

/// Paginated envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Page<T> {
    pub results: Vec<T>,
    #[serde(default = "one")]
    pub total_pages: u32,
}

fn one() -> u32 {
    1
}

/// Date filter for transaction listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Connection status derived from webhook events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Active,
    Error,
    LoginRequired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_status_tolerates_new_values() {
        let item: Item = serde_json::from_value(serde_json::json!({
            "id": "item-1",
            "status": "MERGING",
            "connector": {"id": 201, "name": "Banco Teste"}
        }))
        .unwrap();
        assert_eq!(item.status, ItemStatus::Unknown);
        assert_eq!(item.connector.unwrap().name, "Banco Teste");
    }

    #[test]
    fn test_item_status_maps_to_connection_status() {
        assert_eq!(ItemStatus::Updated.connection_status(), Some(ConnectionStatus::Active));
        assert_eq!(ItemStatus::Updating.connection_status(), Some(ConnectionStatus::Active));
        assert_eq!(ItemStatus::LoginError.connection_status(), Some(ConnectionStatus::LoginRequired));
        assert_eq!(ItemStatus::WaitingUserInput.connection_status(), Some(ConnectionStatus::LoginRequired));
        assert_eq!(ItemStatus::Outdated.connection_status(), Some(ConnectionStatus::Error));
        assert_eq!(ItemStatus::Unknown.connection_status(), None);
    }

    #[test]
    fn test_page_defaults_to_single_page() {
        let page: Page<Account> = serde_json::from_value(serde_json::json!({"results": []})).unwrap();
        assert_eq!(page.total_pages, 1);
    }
}
