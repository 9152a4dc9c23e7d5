use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use docflow_core::{
    DocumentProcessor, EngineBackend, FileStatusStore, FsBlobStore, HttpSearchBackend,
    HttpTextExtractor, IngestionGateway, JobQueue, PlainTextExtractor, QueryGateway, SearchIndex,
    StatusStore, TextExtractor, WorkerPool,
};
use docflow_server::routes::{build_router, AppState};

#[derive(Debug, Parser)]
#[command(name = "docflow-server", version, about = "Document ingestion and search pipeline")]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "DOCFLOW_LISTEN_ADDR", default_value = "127.0.0.1:8080")]
    listen_addr: SocketAddr,

    /// Directory holding the status store, blob store and search index.
    #[arg(long, env = "DOCFLOW_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Number of processing workers.
    #[arg(long, env = "DOCFLOW_WORKERS", default_value_t = 3)]
    workers: usize,

    /// Bound on the in-flight job queue; uploads block once it is full.
    #[arg(long, env = "DOCFLOW_QUEUE_CAPACITY", default_value_t = 256)]
    queue_capacity: usize,

    /// Base URL of a remote text extraction service. When unset, only
    /// plain-text payloads are extracted in-process.
    #[arg(long, env = "DOCFLOW_EXTRACTOR_URL")]
    extractor_url: Option<String>,

    /// Base URL of a secondary search service used when the local index
    /// engine is unavailable.
    #[arg(long, env = "DOCFLOW_FALLBACK_SEARCH_URL")]
    fallback_search_url: Option<String>,

    /// Seconds to wait for in-flight jobs on shutdown.
    #[arg(long, env = "DOCFLOW_DRAIN_TIMEOUT_SECS", default_value_t = 10)]
    drain_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = Arc::new(
        FileStatusStore::open(&cli.data_dir.join("meta"))
            .await
            .context("opening status store")?,
    );
    let blobs = Arc::new(
        FsBlobStore::open(&cli.data_dir.join("blobs"))
            .await
            .context("opening blob store")?,
    );
    let index =
        Arc::new(SearchIndex::open(&cli.data_dir.join("index")).context("opening search index")?);

    let (queue, consumer) = JobQueue::bounded(cli.queue_capacity);
    let extractor: Arc<dyn TextExtractor> = match &cli.extractor_url {
        Some(url) => {
            tracing::info!(%url, "using remote text extraction");
            Arc::new(HttpTextExtractor::new(url))
        }
        None => Arc::new(PlainTextExtractor),
    };
    let processor = Arc::new(DocumentProcessor::new(
        store.clone(),
        blobs.clone(),
        extractor,
        index.clone(),
    ));
    let pool = WorkerPool::spawn(cli.workers, consumer, processor);

    let ingestion = Arc::new(IngestionGateway::new(store.clone(), blobs, queue));
    let requeued = ingestion
        .requeue_incomplete()
        .await
        .context("requeuing unfinished documents")?;
    if requeued > 0 {
        tracing::info!(count = requeued, "requeued documents left unfinished by a previous run");
    }

    let mut query = QueryGateway::new(Arc::new(EngineBackend::new(index.clone())));
    if let Some(url) = &cli.fallback_search_url {
        tracing::info!(%url, "secondary search route configured");
        query = query.with_fallback(Arc::new(HttpSearchBackend::new(url)));
    }

    let state = AppState {
        store: store.clone() as Arc<dyn StatusStore>,
        index: index.clone(),
        ingestion,
        query: Arc::new(query),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen_addr)
        .await
        .with_context(|| format!("binding {}", cli.listen_addr))?;
    tracing::info!(addr = %cli.listen_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    pool.shutdown(Duration::from_secs(cli.drain_timeout_secs)).await;

    match Arc::try_unwrap(index) {
        Ok(engine) => engine.close().context("closing search index")?,
        Err(_) => tracing::debug!("index still referenced at exit; write lock released on drop"),
    }

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "could not install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(error) = result {
                tracing::warn!(%error, "could not listen for ctrl-c");
            }
        }
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received; draining");
}
