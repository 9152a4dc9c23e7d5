use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{IndexError, PipelineError};
use crate::index::SearchIndex;
use crate::models::SearchHit;
use crate::traits::SearchBackend;

/// Primary route: searches the in-process index engine.
pub struct EngineBackend {
    index: Arc<SearchIndex>,
}

impl EngineBackend {
    pub fn new(index: Arc<SearchIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl SearchBackend for EngineBackend {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, PipelineError> {
        self.index.search(query, max_results).map_err(|e| match e {
            IndexError::QueryParse { query, message } => {
                PipelineError::QueryParse { query, message }
            }
            other => PipelineError::upstream("index engine", other),
        })
    }
}

/// Secondary route: an HTTP search service exposing the identical
/// contract (`GET {base}/search?q=&max=` returning an array of hits).
pub struct HttpSearchBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSearchBackend {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, PipelineError> {
        let url = format!("{}/search", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("q", query), ("max", &max_results.to_string())])
            .send()
            .await
            .map_err(|e| PipelineError::upstream("search service", e))?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            let message = response.text().await.unwrap_or_default();
            return Err(PipelineError::QueryParse {
                query: query.to_string(),
                message,
            });
        }
        if !status.is_success() {
            return Err(PipelineError::Upstream {
                service: "search service".to_string(),
                details: format!("{url} returned {status}"),
            });
        }

        response
            .json::<Vec<SearchHit>>()
            .await
            .map_err(|e| PipelineError::upstream("search service", e))
    }
}

/// Client-facing search entry point with fallback routing.
///
/// Delegates to the primary backend; only when that route is
/// unavailable does it try the secondary one. A query-parse failure is
/// not an availability failure and propagates immediately — callers can
/// always distinguish "no matches" from "search unavailable".
pub struct QueryGateway {
    primary: Arc<dyn SearchBackend>,
    secondary: Option<Arc<dyn SearchBackend>>,
}

impl QueryGateway {
    pub fn new(primary: Arc<dyn SearchBackend>) -> Self {
        Self {
            primary,
            secondary: None,
        }
    }

    pub fn with_fallback(mut self, secondary: Arc<dyn SearchBackend>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, PipelineError> {
        if query.trim().is_empty() {
            return Err(PipelineError::Validation(
                "query parameter must not be empty".to_string(),
            ));
        }

        match self.primary.search(query, max_results).await {
            Ok(hits) => Ok(hits),
            Err(primary_error) if primary_error.is_unavailable() => {
                let Some(secondary) = &self.secondary else {
                    return Err(primary_error);
                };
                tracing::warn!(
                    %primary_error,
                    "primary search route unavailable; trying secondary"
                );
                secondary.search(query, max_results).await.map_err(|e| {
                    if e.is_unavailable() {
                        PipelineError::Upstream {
                            service: "search".to_string(),
                            details: format!(
                                "primary route: {primary_error}; secondary route: {e}"
                            ),
                        }
                    } else {
                        e
                    }
                })
            }
            Err(other) => Err(other),
        }
    }
}
