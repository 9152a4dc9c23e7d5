pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod models;
pub mod query;
pub mod queue;
pub mod stores;
pub mod traits;
pub mod worker;

pub use error::{IndexError, PipelineError, Result};
pub use extract::{HttpTextExtractor, PlainTextExtractor};
pub use index::SearchIndex;
pub use ingest::{guess_content_type, IngestionGateway};
pub use models::{
    make_snippet, DocumentRecord, DocumentStatus, ProcessingJob, SearchHit, SNIPPET_MARKER,
    SNIPPET_MAX_CHARS,
};
pub use query::{EngineBackend, HttpSearchBackend, QueryGateway};
pub use queue::{JobConsumer, JobQueue};
pub use stores::{FileStatusStore, FsBlobStore};
pub use traits::{BlobStore, SearchBackend, StatusStore, TextExtractor};
pub use worker::{DocumentProcessor, WorkerPool};
