//! Contingency state machine.
//!
//! # States
//! - Normal: documents go to the authority
//! - Contingency(type): documents are tagged and transmitted later
//!
//! # State Transitions
//! ```text
//! Normal → Contingency(t): enable(t, reason)
//! Contingency(t) → Normal: disable()
//! anything else: no-op, reported as Transition::Ignored
//! ```
//!
//! # Design Decisions
//! - Only explicit calls change state, never a timer
//! - At most one open record per owner; history is append-only
//! - A failed save leaves the in-memory state untouched
//! - Every transition re-reads the store first, so processes sharing one
//!   store never overwrite each other's records

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::IntegrationResult;
use crate::fiscal::store::ContingencyStore;
use crate::fiscal::types::{ContingencyRecord, ContingencyState, ContingencyType, Transition};
use crate::observability::metrics;

pub struct ContingencyStateMachine {
    owner: String,
    store: Arc<dyn ContingencyStore>,
    /// Last history read from the store (all owners), guarded for read-modify-write.
    history: Mutex<Vec<ContingencyRecord>>,
    /// Lock-free snapshot for readers on the issuance path.
    current: ArcSwap<ContingencyState>,
}

/// Current state of `owner` in `history`.
fn state_of(owner: &str, history: &[ContingencyRecord]) -> ContingencyState {
    history
        .iter()
        .rev()
        .find(|r| r.owner == owner && r.is_active())
        .map_or(ContingencyState::Normal, |r| ContingencyState::Contingency(r.kind))
}

impl ContingencyStateMachine {
    /// Load the owner's state from `store`.
    pub async fn load(owner: impl Into<String>, store: Arc<dyn ContingencyStore>) -> IntegrationResult<Self> {
        let owner = owner.into();
        let history = store.load().await?;
        let state = state_of(&owner, &history);

        tracing::info!(owner = %owner, state = ?state, "Contingency state loaded");
        metrics::record_contingency_active(state != ContingencyState::Normal);

        Ok(Self {
            owner,
            store,
            history: Mutex::new(history),
            current: ArcSwap::from_pointee(state),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn state(&self) -> ContingencyState {
        **self.current.load()
    }

    pub fn active_type(&self) -> Option<ContingencyType> {
        self.state().active_type()
    }

    /// Re-read the store, picking up transitions made by other processes
    /// sharing it (the operator CLI, another replica).
    pub async fn refresh(&self) -> IntegrationResult<ContingencyState> {
        let mut history = self.history.lock().await;
        self.sync(&mut history).await
    }

    /// Replace `history` with the stored one and publish the owner's state.
    async fn sync(&self, history: &mut Vec<ContingencyRecord>) -> IntegrationResult<ContingencyState> {
        let stored = self.store.load().await?;
        let state = state_of(&self.owner, &stored);
        *history = stored;

        let previous = *self.current.swap(Arc::new(state));
        if previous != state {
            metrics::record_contingency_active(state != ContingencyState::Normal);
            tracing::warn!(owner = %self.owner, from = ?previous, to = ?state, "Contingency state changed in store");
        }
        Ok(state)
    }

    /// Enter contingency. A no-op unless the owner is in `Normal`.
    pub async fn enable(&self, kind: ContingencyType, reason: &str) -> IntegrationResult<Transition> {
        let mut history = self.history.lock().await;

        let state = self.sync(&mut history).await?;
        if state != ContingencyState::Normal {
            tracing::info!(owner = %self.owner, requested = %kind, state = ?state, "Contingency already active, enable ignored");
            return Ok(Transition::Ignored(state));
        }

        let record = ContingencyRecord::open(self.owner.clone(), kind, reason);
        let mut updated = history.clone();
        updated.push(record.clone());
        self.store.save(&updated).await?;

        *history = updated;
        self.current.store(Arc::new(ContingencyState::Contingency(kind)));
        metrics::record_contingency_active(true);
        tracing::warn!(owner = %self.owner, kind = %kind, reason, "Contingency mode entered");

        Ok(Transition::Entered(record))
    }

    /// Leave contingency. A no-op while already `Normal`.
    pub async fn disable(&self) -> IntegrationResult<Transition> {
        let mut history = self.history.lock().await;

        self.sync(&mut history).await?;
        let Some(index) = history
            .iter()
            .rposition(|r| r.owner == self.owner && r.is_active())
        else {
            tracing::debug!(owner = %self.owner, "Contingency not active, disable ignored");
            return Ok(Transition::Ignored(ContingencyState::Normal));
        };

        let mut updated = history.clone();
        updated[index].ended_at = Some(Utc::now());
        let closed = updated[index].clone();
        self.store.save(&updated).await?;

        *history = updated;
        self.current.store(Arc::new(ContingencyState::Normal));
        metrics::record_contingency_active(false);
        tracing::info!(owner = %self.owner, kind = %closed.kind, "Contingency mode exited");

        Ok(Transition::Exited(closed))
    }

    /// This owner's records, oldest first, as of the last store read.
    pub async fn history(&self) -> Vec<ContingencyRecord> {
        self.history
            .lock()
            .await
            .iter()
            .filter(|r| r.owner == self.owner)
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for ContingencyStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContingencyStateMachine")
            .field("owner", &self.owner)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::error::{IntegrationError, StoreError};
    use crate::fiscal::store::MemoryContingencyStore;

    async fn machine() -> ContingencyStateMachine {
        ContingencyStateMachine::load("acme", Arc::new(MemoryContingencyStore::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_enable_twice_keeps_one_active_record() {
        let machine = machine().await;

        let first = machine.enable(ContingencyType::SvcAn, "service offline").await.unwrap();
        assert!(matches!(first, Transition::Entered(_)));

        let second = machine.enable(ContingencyType::Epec, "other").await.unwrap();
        assert_eq!(
            second,
            Transition::Ignored(ContingencyState::Contingency(ContingencyType::SvcAn))
        );

        let history = machine.history().await;
        assert_eq!(history.iter().filter(|r| r.is_active()).count(), 1);
        assert_eq!(machine.active_type(), Some(ContingencyType::SvcAn));
    }

    #[tokio::test]
    async fn test_disable_while_normal_is_noop() {
        let machine = machine().await;
        assert!(machine.disable().await.unwrap().is_ignored());
        assert!(machine.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_full_cycle_closes_record() {
        let machine = machine().await;
        machine.enable(ContingencyType::Offline, "maintenance").await.unwrap();

        match machine.disable().await.unwrap() {
            Transition::Exited(record) => {
                assert_eq!(record.kind, ContingencyType::Offline);
                assert!(record.ended_at.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(machine.state(), ContingencyState::Normal);

        // A new period may start after the previous one closed.
        machine.enable(ContingencyType::SvcRs, "again").await.unwrap();
        assert_eq!(machine.history().await.len(), 2);
    }

    #[tokio::test]
    async fn test_state_survives_reload() {
        let store: Arc<dyn ContingencyStore> = Arc::new(MemoryContingencyStore::new());
        let machine = ContingencyStateMachine::load("acme", store.clone()).await.unwrap();
        machine.enable(ContingencyType::Epec, "offline").await.unwrap();

        let reloaded = ContingencyStateMachine::load("acme", store.clone()).await.unwrap();
        assert_eq!(reloaded.active_type(), Some(ContingencyType::Epec));

        let other_owner = ContingencyStateMachine::load("globex", store).await.unwrap();
        assert_eq!(other_owner.state(), ContingencyState::Normal);
    }

    #[tokio::test]
    async fn test_machines_sharing_a_file_see_each_other() {
        use crate::fiscal::store::FileContingencyStore;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contingency.json");
        let service = ContingencyStateMachine::load("acme", Arc::new(FileContingencyStore::new(&path)))
            .await
            .unwrap();
        let operator = ContingencyStateMachine::load("acme", Arc::new(FileContingencyStore::new(&path)))
            .await
            .unwrap();

        operator.enable(ContingencyType::SvcAn, "manual").await.unwrap();
        assert_eq!(
            service.refresh().await.unwrap(),
            ContingencyState::Contingency(ContingencyType::SvcAn)
        );
        assert_eq!(service.active_type(), Some(ContingencyType::SvcAn));

        // The service's own enable sees the operator's record instead of overwriting it.
        let transition = service.enable(ContingencyType::Offline, "auto").await.unwrap();
        assert!(transition.is_ignored());

        // And the service can leave a contingency the operator entered.
        assert!(matches!(service.disable().await.unwrap(), Transition::Exited(_)));

        let on_disk = FileContingencyStore::new(&path).load().await.unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk[0].kind, ContingencyType::SvcAn);
        assert!(on_disk[0].ended_at.is_some());

        assert_eq!(operator.refresh().await.unwrap(), ContingencyState::Normal);
    }

    struct FailingStore;

    #[async_trait]
    impl ContingencyStore for FailingStore {
        async fn load(&self) -> Result<Vec<ContingencyRecord>, StoreError> {
            Ok(Vec::new())
        }

        async fn save(&self, _records: &[ContingencyRecord]) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".into()))
        }
    }

    #[tokio::test]
    async fn test_failed_save_keeps_state() {
        let machine = ContingencyStateMachine::load("acme", Arc::new(FailingStore)).await.unwrap();
        let err = machine.enable(ContingencyType::SvcAn, "offline").await.unwrap_err();
        assert!(matches!(err, IntegrationError::Storage(_)));
        assert_eq!(machine.state(), ContingencyState::Normal);
    }
}
