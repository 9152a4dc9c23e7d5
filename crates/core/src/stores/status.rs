use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::PipelineError;
use crate::models::{DocumentRecord, DocumentStatus};
use crate::traits::StatusStore;

const SNAPSHOT_FILE: &str = "documents.json";
const SNAPSHOT_TMP: &str = "documents.json.tmp";

/// File-backed status store: a metadata map held in memory and
/// persisted as a JSON snapshot on every mutation.
///
/// Writes go to a temp file first and are renamed into place, so the
/// snapshot on disk is always a complete committed state. Reads serve
/// the in-memory map, which is the latest committed write by
/// construction (mutations hold the write lock across persist).
pub struct FileStatusStore {
    dir: PathBuf,
    records: RwLock<BTreeMap<String, DocumentRecord>>,
}

impl FileStatusStore {
    /// Opens the store rooted at `dir`, loading any existing snapshot.
    pub async fn open(dir: &Path) -> Result<Self, PipelineError> {
        tokio::fs::create_dir_all(dir).await?;

        let snapshot = dir.join(SNAPSHOT_FILE);
        let records = match tokio::fs::read(&snapshot).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            records: RwLock::new(records),
        })
    }

    async fn persist(&self, records: &BTreeMap<String, DocumentRecord>) -> Result<(), PipelineError> {
        let bytes = serde_json::to_vec_pretty(records)?;
        let tmp = self.dir.join(SNAPSHOT_TMP);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, self.dir.join(SNAPSHOT_FILE)).await?;
        Ok(())
    }
}

#[async_trait]
impl StatusStore for FileStatusStore {
    async fn create(&self, record: DocumentRecord) -> Result<(), PipelineError> {
        let mut records = self.records.write().await;
        records.insert(record.id.clone(), record);
        self.persist(&records).await
    }

    async fn get(&self, id: &str) -> Result<DocumentRecord, PipelineError> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<DocumentRecord>, PipelineError> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn update_status(
        &self,
        id: &str,
        status: DocumentStatus,
    ) -> Result<DocumentRecord, PipelineError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))?;
        record.status = status;
        let updated = record.clone();
        self.persist(&records).await?;
        Ok(updated)
    }

    async fn store_extracted_text(&self, id: &str, text: &str) -> Result<(), PipelineError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))?;
        record.extracted_text = Some(text.to_string());
        self.persist(&records).await
    }

    async fn delete(&self, id: &str) -> Result<(), PipelineError> {
        let mut records = self.records.write().await;
        if records.remove(id).is_none() {
            return Err(PipelineError::NotFound(id.to_string()));
        }
        self.persist(&records).await
    }
}
