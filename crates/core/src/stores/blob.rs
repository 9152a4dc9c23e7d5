use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::traits::BlobStore;

/// Filesystem blob store: one file per document id.
///
/// Writes land in a temp file and are renamed into place so a crash
/// mid-write never leaves a partial blob under the final name.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub async fn open(root: &Path) -> Result<Self, PipelineError> {
        tokio::fs::create_dir_all(root).await?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn blob_path(&self, name: &str) -> Result<PathBuf, PipelineError> {
        // Refs are flat file names produced by `put`; reject anything
        // that could escape the blob root.
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(PipelineError::Validation(format!(
                "invalid blob reference: {name}"
            )));
        }
        Ok(self.root.join(name))
    }

    fn file_name(id: &str) -> String {
        format!("{id}.bin")
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, id: &str, bytes: &[u8]) -> Result<String, PipelineError> {
        let file_name = Self::file_name(id);
        let final_path = self.blob_path(&file_name)?;
        let tmp_path = self.blob_path(&format!("{file_name}.tmp"))?;

        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;

        tracing::debug!(document_id = %id, size = bytes.len(), "blob stored");
        Ok(file_name)
    }

    async fn get(&self, blob_ref: &str) -> Result<Vec<u8>, PipelineError> {
        let path = self.blob_path(blob_ref)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PipelineError::NotFound(blob_ref.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, PipelineError> {
        let path = self.blob_path(&Self::file_name(id))?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
