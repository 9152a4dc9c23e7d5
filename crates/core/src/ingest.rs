use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{DocumentRecord, DocumentStatus, ProcessingJob};
use crate::queue::JobQueue;
use crate::traits::{BlobStore, StatusStore};

/// Accepts uploads: persists blob + metadata durably, then enqueues a
/// processing job.
pub struct IngestionGateway {
    store: Arc<dyn StatusStore>,
    blobs: Arc<dyn BlobStore>,
    queue: JobQueue,
}

impl IngestionGateway {
    pub fn new(store: Arc<dyn StatusStore>, blobs: Arc<dyn BlobStore>, queue: JobQueue) -> Self {
        Self {
            store,
            blobs,
            queue,
        }
    }

    /// Stores a new document and queues it for processing.
    ///
    /// Success means the blob and the `Pending` metadata record are
    /// durable. A publish failure after that point is logged but does
    /// not fail the upload: the document stays `Pending` and
    /// [`requeue_incomplete`](Self::requeue_incomplete) re-drives it.
    pub async fn upload(
        &self,
        name: Option<&str>,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<DocumentRecord, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::Validation(
                "uploaded file must not be empty".to_string(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let name = match name.map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => id.clone(),
        };
        let checksum = format!("{:x}", Sha256::digest(bytes));

        let blob_ref = self.blobs.put(&id, bytes).await?;
        let record = DocumentRecord {
            id: id.clone(),
            name: name.clone(),
            content_type: content_type.to_string(),
            size: bytes.len() as u64,
            upload_date: Utc::now(),
            status: DocumentStatus::Pending,
            checksum,
            blob_ref: blob_ref.clone(),
            extracted_text: None,
        };
        self.store.create(record.clone()).await?;
        tracing::info!(document_id = %id, name = %name, size = bytes.len(), "document stored");

        let job = ProcessingJob {
            document_id: id.clone(),
            name,
            content_type: content_type.to_string(),
            blob_ref,
        };
        if let Err(error) = self.queue.publish(job).await {
            tracing::warn!(
                document_id = %id,
                %error,
                "job publish failed; document stays PENDING until requeued"
            );
        }

        Ok(record)
    }

    /// Removes metadata and blob. Removing the index entry is a
    /// separate explicit operation on the engine.
    pub async fn delete(&self, id: &str) -> Result<(), PipelineError> {
        self.store.get(id).await?;
        self.store.delete(id).await?;
        self.blobs.delete(id).await?;
        tracing::info!(document_id = %id, "document deleted");
        Ok(())
    }

    /// Re-publishes a job for every document not yet in a terminal
    /// status. `Pending` means the original publish was lost;
    /// `Processing` means a previous worker died mid-job. Replaying
    /// either converges, so this is safe to run at startup or as an
    /// operational re-drive. Returns the number of jobs published.
    pub async fn requeue_incomplete(&self) -> Result<usize, PipelineError> {
        let mut published = 0;
        for record in self.store.list().await? {
            if record.status.is_terminal() {
                continue;
            }
            self.queue
                .publish(ProcessingJob {
                    document_id: record.id.clone(),
                    name: record.name,
                    content_type: record.content_type,
                    blob_ref: record.blob_ref,
                })
                .await?;
            published += 1;
        }
        if published > 0 {
            tracing::info!(count = published, "requeued unfinished documents");
        }
        Ok(published)
    }
}

/// Guesses a MIME type from the file extension; falls back to
/// `application/octet-stream`.
pub fn guess_content_type(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    match lower.rsplit('.').next().unwrap_or_default() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "csv" => "text/csv",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
}
