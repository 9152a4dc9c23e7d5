use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::error::PipelineError;
use crate::models::ProcessingJob;

/// Shared consumer end of the job queue. Workers take turns waiting on
/// the channel; only one waits at a time, but processing runs in
/// parallel once a job is claimed.
pub type JobConsumer = Arc<Mutex<mpsc::Receiver<ProcessingJob>>>;

/// Bounded in-process job queue decoupling upload from processing.
///
/// The bound is the backpressure mechanism: when every worker is busy
/// and the channel is full, publishers wait instead of spawning
/// unbounded work.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<ProcessingJob>,
}

impl JobQueue {
    /// Creates a queue with the given capacity, returning the publisher
    /// handle and the shared consumer end for the worker pool.
    pub fn bounded(capacity: usize) -> (Self, JobConsumer) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, Arc::new(Mutex::new(rx)))
    }

    /// Publishes one job, waiting when the queue is full.
    pub async fn publish(&self, job: ProcessingJob) -> Result<(), PipelineError> {
        tracing::debug!(document_id = %job.document_id, "publishing processing job");
        self.tx
            .send(job)
            .await
            .map_err(|_| PipelineError::QueueClosed)
    }
}
