use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use docflow_core::{
    guess_content_type, DocumentRecord, DocumentStatus, IndexError, IngestionGateway,
    PipelineError, QueryGateway, SearchHit, SearchIndex, StatusStore,
};

const DEFAULT_MAX_RESULTS: usize = 20;
const UPLOAD_BODY_LIMIT_BYTES: usize = 32 * 1024 * 1024;

/// Shared handler dependencies, wired once at startup.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StatusStore>,
    pub index: Arc<SearchIndex>,
    pub ingestion: Arc<IngestionGateway>,
    pub query: Arc<QueryGateway>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/documents", post(upload_document).get(list_documents))
        .route("/documents/:id", get(get_document).delete(delete_document))
        .route("/documents/:id/status", put(update_status))
        .route("/index", post(index_document))
        .route("/search", get(search))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT_BYTES))
        .with_state(state)
}

/// Maps pipeline errors onto HTTP statuses with a JSON error body.
pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PipelineError::Validation(_)
            | PipelineError::QueryParse { .. }
            | PipelineError::Index(IndexError::QueryParse { .. }) => StatusCode::BAD_REQUEST,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::Upstream { .. }
            | PipelineError::QueueClosed
            | PipelineError::Index(IndexError::WriteConflict(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, %status, "request failed");
        } else {
            tracing::debug!(error = %self.0, %status, "request rejected");
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentRecord>), ApiError> {
    let mut file: Option<(Option<String>, Option<String>, Vec<u8>)> = None;
    let mut override_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PipelineError::Validation(format!("malformed multipart body: {e}")))?
    {
        let part = field.name().map(str::to_string);
        match part.as_deref() {
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let declared = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    PipelineError::Validation(format!("could not read file part: {e}"))
                })?;
                file = Some((file_name, declared, bytes.to_vec()));
            }
            Some("name") => {
                let value = field.text().await.map_err(|e| {
                    PipelineError::Validation(format!("could not read name part: {e}"))
                })?;
                override_name = Some(value);
            }
            _ => {}
        }
    }

    let Some((file_name, declared, bytes)) = file else {
        return Err(PipelineError::Validation(
            "multipart field \"file\" is required".to_string(),
        )
        .into());
    };

    let name = override_name.or(file_name);
    let content_type = match declared.as_deref() {
        Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => ct.to_string(),
        _ => guess_content_type(name.as_deref().unwrap_or_default()).to_string(),
    };

    let record = state
        .ingestion
        .upload(name.as_deref(), &content_type, &bytes)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_documents(
    State(state): State<AppState>,
) -> Result<Json<Vec<DocumentRecord>>, ApiError> {
    Ok(Json(state.store.list().await?))
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentRecord>, ApiError> {
    Ok(Json(state.store.get(&id).await?))
}

async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.ingestion.delete(&id).await?;
    Ok(Json(json!({ "status": "deleted", "id": id })))
}

#[derive(Debug, Deserialize)]
struct StatusUpdateRequest {
    status: String,
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusUpdateRequest>,
) -> Result<Json<DocumentRecord>, ApiError> {
    let Some(status) = DocumentStatus::parse(&body.status) else {
        return Err(PipelineError::Validation(format!("unknown status: {}", body.status)).into());
    };
    let record = state.store.update_status(&id, status).await?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
struct IndexRequest {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    text: String,
}

async fn index_document(
    State(state): State<AppState>,
    Json(body): Json<IndexRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.id.trim().is_empty() {
        return Err(PipelineError::Validation("id must not be empty".to_string()).into());
    }

    state
        .index
        .upsert(&body.id, &body.name, &body.text)
        .map_err(PipelineError::from)?;
    let count = state.index.document_count().map_err(PipelineError::from)?;

    Ok(Json(json!({
        "status": "indexed",
        "id": body.id,
        "documentCount": count,
    })))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    max: Option<usize>,
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    let Some(q) = params.q else {
        return Err(
            PipelineError::Validation("query parameter \"q\" is required".to_string()).into(),
        );
    };

    let hits = state
        .query
        .search(&q, params.max.unwrap_or(DEFAULT_MAX_RESULTS))
        .await?;
    Ok(Json(hits))
}

// The probe always answers; an unreadable index is reported as DOWN,
// not as a failed request.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let timestamp = Utc::now().timestamp_millis();
    let body = match state.index.document_count() {
        Ok(count) => json!({
            "status": "UP",
            "documentCount": count,
            "timestamp": timestamp,
        }),
        Err(error) => {
            tracing::error!(%error, "health probe could not read the index");
            json!({ "status": "DOWN", "timestamp": timestamp })
        }
    };
    Json(body)
}

async fn stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let count = state.index.document_count().map_err(PipelineError::from)?;
    Ok(Json(json!({
        "documentCount": count,
        "timestamp": Utc::now().timestamp_millis(),
    })))
}
