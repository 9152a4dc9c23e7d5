use async_trait::async_trait;

use crate::error::PipelineError;
use crate::models::{DocumentRecord, DocumentStatus, SearchHit};

/// Authoritative record of document metadata and lifecycle status.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn create(&self, record: DocumentRecord) -> Result<(), PipelineError>;

    async fn get(&self, id: &str) -> Result<DocumentRecord, PipelineError>;

    async fn list(&self) -> Result<Vec<DocumentRecord>, PipelineError>;

    /// Updates the lifecycle status. Fails with `NotFound` for an
    /// unknown id; never creates a record implicitly.
    async fn update_status(
        &self,
        id: &str,
        status: DocumentStatus,
    ) -> Result<DocumentRecord, PipelineError>;

    /// Records the extracted text for a processed document.
    async fn store_extracted_text(&self, id: &str, text: &str) -> Result<(), PipelineError>;

    async fn delete(&self, id: &str) -> Result<(), PipelineError>;
}

/// Durable storage for raw document bytes, keyed by document id.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores the bytes and returns a reference sufficient to retrieve
    /// them later. Writing the same id again replaces the content.
    async fn put(&self, id: &str, bytes: &[u8]) -> Result<String, PipelineError>;

    async fn get(&self, blob_ref: &str) -> Result<Vec<u8>, PipelineError>;

    /// Removes the blob. Returns whether anything existed.
    async fn delete(&self, id: &str) -> Result<bool, PipelineError>;
}

/// Opaque text extraction: raw bytes in, plain text out.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, content_type: &str, bytes: &[u8]) -> Result<String, PipelineError>;
}

/// One search route with the full query-gateway contract. The gateway
/// holds a primary backend and optionally a secondary one with the
/// identical contract for fallback routing.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<SearchHit>, PipelineError>;
}
