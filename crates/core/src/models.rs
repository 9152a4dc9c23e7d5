use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a document in the pipeline.
///
/// A document is created in `Pending` and moves through
/// `Processing` to either `Processed` or `Failed`. Re-processing a
/// document (for example after a queue redelivery) re-enters
/// `Processing` regardless of any prior terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

impl DocumentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::Processed | DocumentStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Pending => "PENDING",
            DocumentStatus::Processing => "PROCESSING",
            DocumentStatus::Processed => "PROCESSED",
            DocumentStatus::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(DocumentStatus::Pending),
            "PROCESSING" => Some(DocumentStatus::Processing),
            "PROCESSED" => Some(DocumentStatus::Processed),
            "FAILED" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authoritative metadata record for a document, owned by the status
/// store. The blob content itself lives in the blob store and is
/// referenced by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub upload_date: DateTime<Utc>,
    pub status: DocumentStatus,
    pub checksum: String,
    pub blob_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
}

/// Queue payload describing one processing attempt. Carries a blob
/// reference rather than the bytes to keep messages small.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingJob {
    pub document_id: String,
    pub name: String,
    pub content_type: String,
    pub blob_ref: String,
}

/// A single hit returned from a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub name: String,
    pub score: f32,
    pub snippet: String,
}

/// Maximum snippet length in characters before truncation.
pub const SNIPPET_MAX_CHARS: usize = 200;

/// Marker appended to a snippet when the stored text was truncated.
pub const SNIPPET_MARKER: &str = "...";

/// Builds a bounded snippet from stored text: the untouched text when it
/// fits, otherwise a char-boundary-safe prefix with the marker appended.
pub fn make_snippet(text: &str) -> String {
    let mut chars = text.char_indices();
    match chars.nth(SNIPPET_MAX_CHARS) {
        None => text.to_string(),
        Some((byte_offset, _)) => format!("{}{}", &text[..byte_offset], SNIPPET_MARKER),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_wire_casing() {
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Processing,
            DocumentStatus::Processed,
            DocumentStatus::Failed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            let back: DocumentStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(back, status);
            assert_eq!(DocumentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DocumentStatus::parse("bogus"), None);
        assert_eq!(DocumentStatus::parse(" processed "), Some(DocumentStatus::Processed));
    }

    #[test]
    fn job_payload_uses_camel_case_keys() {
        let job = ProcessingJob {
            document_id: "d-1".to_string(),
            name: "report.txt".to_string(),
            content_type: "text/plain".to_string(),
            blob_ref: "d-1.bin".to_string(),
        };

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["documentId"], "d-1");
        assert_eq!(value["contentType"], "text/plain");
        assert_eq!(value["blobRef"], "d-1.bin");
    }

    #[test]
    fn short_text_is_not_truncated() {
        let text = "a".repeat(50);
        assert_eq!(make_snippet(&text), text);
    }

    #[test]
    fn long_text_is_truncated_with_marker() {
        let text = "b".repeat(1_000);
        let snippet = make_snippet(&text);
        assert_eq!(snippet.chars().count(), SNIPPET_MAX_CHARS + SNIPPET_MARKER.len());
        assert!(snippet.ends_with(SNIPPET_MARKER));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "é".repeat(SNIPPET_MAX_CHARS + 10);
        let snippet = make_snippet(&text);
        assert!(snippet.ends_with(SNIPPET_MARKER));
        assert_eq!(snippet.chars().count(), SNIPPET_MAX_CHARS + SNIPPET_MARKER.len());
    }

    #[test]
    fn exact_boundary_text_is_unchanged() {
        let text = "c".repeat(SNIPPET_MAX_CHARS);
        assert_eq!(make_snippet(&text), text);
    }
}
