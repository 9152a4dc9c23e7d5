use async_trait::async_trait;
use serde::Deserialize;

use crate::error::PipelineError;
use crate::traits::TextExtractor;

const EXTRACTION_SERVICE: &str = "text extraction service";

/// In-process extractor for plain-text payloads: a strict UTF-8 decode.
/// Bytes that do not decode are an extraction failure, which the worker
/// turns into a `Failed` status.
#[derive(Debug, Default)]
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, _content_type: &str, bytes: &[u8]) -> Result<String, PipelineError> {
        String::from_utf8(bytes.to_vec()).map_err(|e| PipelineError::Upstream {
            service: EXTRACTION_SERVICE.to_string(),
            details: format!("content is not valid utf-8: {e}"),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    text: String,
}

/// Client for a remote extraction service: POSTs the raw bytes to
/// `{base_url}/parse` and expects `{"text": ...}` back.
#[derive(Debug, Clone)]
pub struct HttpTextExtractor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTextExtractor {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TextExtractor for HttpTextExtractor {
    async fn extract(&self, content_type: &str, bytes: &[u8]) -> Result<String, PipelineError> {
        let url = format!("{}/parse", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header("x-document-content-type", content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| PipelineError::upstream(EXTRACTION_SERVICE, e))?;

        if !response.status().is_success() {
            return Err(PipelineError::Upstream {
                service: EXTRACTION_SERVICE.to_string(),
                details: format!("{url} returned {}", response.status()),
            });
        }

        let payload: ExtractionResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::upstream(EXTRACTION_SERVICE, e))?;

        Ok(payload.text)
    }
}
