use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::PipelineError;
use crate::index::SearchIndex;
use crate::models::{DocumentStatus, ProcessingJob};
use crate::queue::JobConsumer;
use crate::traits::{BlobStore, StatusStore, TextExtractor};

/// Executes the processing state machine for one job:
///
/// 1. status → `Processing` (overwriting any prior terminal state)
/// 2. fetch blob, extract text
/// 3. upsert into the index
/// 4. store extracted text, status → `Processed`
///
/// Any step failure becomes a `Failed` status write and the job is
/// consumed; retry is the queue's redelivery policy, not the worker's.
/// Every step is idempotent, so replaying the same job converges to the
/// same terminal state and the same index content.
pub struct DocumentProcessor {
    store: Arc<dyn StatusStore>,
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<dyn TextExtractor>,
    index: Arc<SearchIndex>,
}

impl DocumentProcessor {
    pub fn new(
        store: Arc<dyn StatusStore>,
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<dyn TextExtractor>,
        index: Arc<SearchIndex>,
    ) -> Self {
        Self {
            store,
            blobs,
            extractor,
            index,
        }
    }

    /// Runs the full pipeline for one job and returns the terminal
    /// status. `Err` means the status store itself could not be
    /// updated (including jobs for documents that no longer exist);
    /// such jobs are logged and consumed by the caller.
    pub async fn process(&self, job: &ProcessingJob) -> Result<DocumentStatus, PipelineError> {
        let id = job.document_id.as_str();
        tracing::info!(document_id = %id, name = %job.name, "processing document");

        self.store
            .update_status(id, DocumentStatus::Processing)
            .await?;

        match self.run_steps(job).await {
            Ok(text) => {
                self.store.store_extracted_text(id, &text).await?;
                self.store.update_status(id, DocumentStatus::Processed).await?;
                tracing::info!(document_id = %id, chars = text.len(), "document processed");
                Ok(DocumentStatus::Processed)
            }
            Err(step_error) => {
                tracing::warn!(
                    document_id = %id,
                    error = %step_error,
                    "processing failed; marking document FAILED"
                );
                self.store.update_status(id, DocumentStatus::Failed).await?;
                Ok(DocumentStatus::Failed)
            }
        }
    }

    async fn run_steps(&self, job: &ProcessingJob) -> Result<String, PipelineError> {
        let bytes = self.blobs.get(&job.blob_ref).await?;
        let text = self.extractor.extract(&job.content_type, &bytes).await?;
        self.index.upsert(&job.document_id, &job.name, &text)?;
        Ok(text)
    }
}

/// Fixed-size pool of workers draining the job queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl WorkerPool {
    /// Spawns `size` workers consuming from the shared queue end.
    pub fn spawn(size: usize, consumer: JobConsumer, processor: Arc<DocumentProcessor>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let size = size.max(1);

        tracing::info!(workers = size, "starting worker pool");
        let handles = (0..size)
            .map(|worker_id| {
                let consumer = consumer.clone();
                let processor = processor.clone();
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(worker_loop(worker_id, consumer, processor, shutdown_rx))
            })
            .collect();

        Self {
            handles,
            shutdown_tx,
        }
    }

    /// Signals shutdown and waits for in-flight jobs to finish, up to
    /// `drain_timeout` overall. Jobs still queued are left for the next
    /// process to pick up.
    pub async fn shutdown(self, drain_timeout: Duration) {
        let _ = self.shutdown_tx.send(true);
        let deadline = tokio::time::Instant::now() + drain_timeout;

        for (worker_id, handle) in self.handles.into_iter().enumerate() {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(join_error)) => {
                    tracing::error!(worker_id, %join_error, "worker task panicked");
                }
                Err(_) => {
                    tracing::warn!(worker_id, "worker did not drain before the timeout");
                }
            }
        }
        tracing::info!("worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    consumer: JobConsumer,
    processor: Arc<DocumentProcessor>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tracing::debug!(worker_id, "worker started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let job = {
            let mut rx = consumer.lock().await;
            tokio::select! {
                job = rx.recv() => job,
                _ = shutdown_rx.changed() => break,
            }
        };

        let Some(job) = job else {
            // Channel closed: no more jobs will ever arrive.
            break;
        };

        match processor.process(&job).await {
            Ok(status) => {
                tracing::debug!(worker_id, document_id = %job.document_id, %status, "job finished");
            }
            Err(error) => {
                tracing::error!(
                    worker_id,
                    document_id = %job.document_id,
                    %error,
                    "job abandoned: status store rejected the update"
                );
            }
        }
    }

    tracing::debug!(worker_id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::PlainTextExtractor;
    use crate::queue::JobQueue;
    use crate::stores::{FileStatusStore, FsBlobStore};
    use async_trait::async_trait;
    use chrono::Utc;
    use crate::models::DocumentRecord;

    struct FailingExtractor;

    #[async_trait]
    impl TextExtractor for FailingExtractor {
        async fn extract(&self, _: &str, _: &[u8]) -> Result<String, PipelineError> {
            Err(PipelineError::upstream(
                "text extraction service",
                "simulated outage",
            ))
        }
    }

    struct Fixture {
        store: Arc<FileStatusStore>,
        blobs: Arc<FsBlobStore>,
        index: Arc<SearchIndex>,
        _tmp: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStatusStore::open(&tmp.path().join("meta")).await.unwrap());
        let blobs = Arc::new(FsBlobStore::open(&tmp.path().join("blobs")).await.unwrap());
        let index = Arc::new(SearchIndex::open_in_ram().unwrap());
        Fixture {
            store,
            blobs,
            index,
            _tmp: tmp,
        }
    }

    async fn seed(fx: &Fixture, id: &str, body: &[u8]) -> ProcessingJob {
        let blob_ref = fx.blobs.put(id, body).await.unwrap();
        fx.store
            .create(DocumentRecord {
                id: id.to_string(),
                name: format!("{id}.txt"),
                content_type: "text/plain".to_string(),
                size: body.len() as u64,
                upload_date: Utc::now(),
                status: DocumentStatus::Pending,
                checksum: String::new(),
                blob_ref: blob_ref.clone(),
                extracted_text: None,
            })
            .await
            .unwrap();

        ProcessingJob {
            document_id: id.to_string(),
            name: format!("{id}.txt"),
            content_type: "text/plain".to_string(),
            blob_ref,
        }
    }

    fn processor(fx: &Fixture, extractor: Arc<dyn TextExtractor>) -> DocumentProcessor {
        DocumentProcessor::new(
            fx.store.clone(),
            fx.blobs.clone(),
            extractor,
            fx.index.clone(),
        )
    }

    #[tokio::test]
    async fn successful_job_ends_processed_and_indexed() {
        let fx = fixture().await;
        let job = seed(&fx, "d1", b"searchable wombat text").await;
        let proc = processor(&fx, Arc::new(PlainTextExtractor));

        let status = proc.process(&job).await.unwrap();
        assert_eq!(status, DocumentStatus::Processed);

        let record = fx.store.get("d1").await.unwrap();
        assert_eq!(record.status, DocumentStatus::Processed);
        assert_eq!(record.extracted_text.as_deref(), Some("searchable wombat text"));
        assert_eq!(fx.index.search("wombat", 10).unwrap().len(), 1);
        assert_eq!(fx.index.document_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn extraction_failure_marks_document_failed() {
        let fx = fixture().await;
        let ok_job = seed(&fx, "ok", b"healthy heron content").await;
        let bad_job = seed(&fx, "bad", b"never extracted").await;

        processor(&fx, Arc::new(PlainTextExtractor))
            .process(&ok_job)
            .await
            .unwrap();
        let status = processor(&fx, Arc::new(FailingExtractor))
            .process(&bad_job)
            .await
            .unwrap();
        assert_eq!(status, DocumentStatus::Failed);

        assert_eq!(fx.store.get("bad").await.unwrap().status, DocumentStatus::Failed);
        assert_eq!(fx.store.get("ok").await.unwrap().status, DocumentStatus::Processed);
        // The failed document never reached the index.
        assert_eq!(fx.index.document_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn replayed_job_converges_to_the_same_state() {
        let fx = fixture().await;
        let job = seed(&fx, "d1", b"redelivered ibis body").await;
        let proc = processor(&fx, Arc::new(PlainTextExtractor));

        assert_eq!(proc.process(&job).await.unwrap(), DocumentStatus::Processed);
        assert_eq!(proc.process(&job).await.unwrap(), DocumentStatus::Processed);

        let record = fx.store.get("d1").await.unwrap();
        assert!(record.status.is_terminal(), "never stuck in PROCESSING");
        assert_eq!(record.status, DocumentStatus::Processed);
        assert_eq!(fx.index.document_count().unwrap(), 1);
        assert_eq!(fx.index.search("ibis", 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replay_after_failure_can_recover() {
        let fx = fixture().await;
        let job = seed(&fx, "d1", b"eventually fine").await;

        // First attempt fails, second succeeds: re-processing starts
        // again from PROCESSING regardless of the prior FAILED state.
        processor(&fx, Arc::new(FailingExtractor))
            .process(&job)
            .await
            .unwrap();
        assert_eq!(fx.store.get("d1").await.unwrap().status, DocumentStatus::Failed);

        let status = processor(&fx, Arc::new(PlainTextExtractor))
            .process(&job)
            .await
            .unwrap();
        assert_eq!(status, DocumentStatus::Processed);
    }

    #[tokio::test]
    async fn job_for_deleted_document_is_an_error_and_indexes_nothing() {
        let fx = fixture().await;
        let job = ProcessingJob {
            document_id: "ghost".to_string(),
            name: "ghost.txt".to_string(),
            content_type: "text/plain".to_string(),
            blob_ref: "ghost.bin".to_string(),
        };

        let err = processor(&fx, Arc::new(PlainTextExtractor))
            .process(&job)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
        assert_eq!(fx.index.document_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn pool_drains_jobs_and_shuts_down() {
        let fx = fixture().await;
        let job_a = seed(&fx, "a", b"first parrot").await;
        let job_b = seed(&fx, "b", b"second parrot").await;

        let (queue, consumer) = JobQueue::bounded(8);
        let proc = Arc::new(processor(&fx, Arc::new(PlainTextExtractor)));
        let pool = WorkerPool::spawn(2, consumer, proc);

        queue.publish(job_a).await.unwrap();
        queue.publish(job_b).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let a = fx.store.get("a").await.unwrap().status;
            let b = fx.store.get("b").await.unwrap().status;
            if a == DocumentStatus::Processed && b == DocumentStatus::Processed {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "jobs did not finish in time: a={a}, b={b}"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        pool.shutdown(Duration::from_secs(2)).await;
        assert_eq!(fx.index.search("parrot", 10).unwrap().len(), 2);
    }
}
