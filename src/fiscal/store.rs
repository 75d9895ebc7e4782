//! Contingency history persistence.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::fiscal::types::ContingencyRecord;

/// Persists the append-only contingency history.
#[async_trait]
pub trait ContingencyStore: Send + Sync {
    /// Every stored record, oldest first.
    async fn load(&self) -> Result<Vec<ContingencyRecord>, StoreError>;

    /// Replace the stored history.
    async fn save(&self, records: &[ContingencyRecord]) -> Result<(), StoreError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryContingencyStore {
    records: Mutex<Vec<ContingencyRecord>>,
}

impl MemoryContingencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContingencyStore for MemoryContingencyStore {
    async fn load(&self) -> Result<Vec<ContingencyRecord>, StoreError> {
        self.records
            .lock()
            .map(|r| r.clone())
            .map_err(|_| StoreError::Unavailable("contingency store lock poisoned".into()))
    }

    async fn save(&self, records: &[ContingencyRecord]) -> Result<(), StoreError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("contingency store lock poisoned".into()))?;
        *guard = records.to_vec();
        Ok(())
    }
}

/// JSON file store. The whole history is rewritten on every save.
#[derive(Debug, Clone)]
pub struct FileContingencyStore {
    path: PathBuf,
}

impl FileContingencyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl ContingencyStore for FileContingencyStore {
    async fn load(&self) -> Result<Vec<ContingencyRecord>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        let records: Vec<ContingencyRecord> = serde_json::from_slice(&bytes)?;
        tracing::debug!(path = %self.path.display(), records = records.len(), "Loaded contingency history");
        Ok(records)
    }

    async fn save(&self, records: &[ContingencyRecord]) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(records)?;
        // Write next to the target and rename so readers never see a partial file.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!(path = %self.path.display(), records = records.len(), "Saved contingency history");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiscal::types::ContingencyType;

    #[tokio::test]
    async fn test_file_store_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileContingencyStore::new(dir.path().join("contingency.json"));
        assert!(store.load().await.unwrap().is_empty());

        let record = ContingencyRecord::open("acme", ContingencyType::SvcAn, "service offline");
        store.save(std::slice::from_ref(&record)).await.unwrap();

        let reopened = FileContingencyStore::new(dir.path().join("contingency.json"));
        assert_eq!(reopened.load().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contingency.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = FileContingencyStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupted(_)));
    }

    #[tokio::test]
    async fn test_memory_store_replaces_history() {
        let store = MemoryContingencyStore::new();
        let a = ContingencyRecord::open("acme", ContingencyType::Epec, "a");
        let b = ContingencyRecord::open("acme", ContingencyType::Offline, "b");
        store.save(&[a]).await.unwrap();
        store.save(std::slice::from_ref(&b)).await.unwrap();
        assert_eq!(store.load().await.unwrap(), vec![b]);
    }
}
