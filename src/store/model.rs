use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Equality-conjunction metadata filter: a document matches only if every
/// key in the filter maps to an equal value in its metadata.
pub type MetadataFilter = Map<String, Value>;

/// Metadata key holding the document creation timestamp (RFC 3339).
pub const META_CREATED_AT: &str = "created_at";

/// Metadata key holding the content length in characters.
pub const META_CONTENT_LENGTH: &str = "content_length";

#[derive(Debug, Clone, Serialize, Deserialize)]
/// A stored text chunk with open metadata.
pub struct Document {
    /// Unique id across the index (caller-supplied or generated).
    pub id: String,
    /// Chunk text.
    pub content: String,
    /// Open mapping of string keys to JSON values; nested maps round-trip.
    pub metadata: Map<String, Value>,
}

impl Document {
    /// Creates a document with a generated UUID id and no caller metadata.
    pub fn new(content: impl Into<String>) -> Self {
        Self::with_metadata(content, Map::new())
    }

    /// Creates a document with a generated UUID id and caller metadata.
    pub fn with_metadata(content: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), content, metadata)
    }

    /// Creates a document with an explicit id.
    ///
    /// System keys (`created_at`, `content_length`) are written first and
    /// caller-supplied metadata merges over them, so a caller key with the
    /// same name silently wins. This precedence is intentional and relied on
    /// by existing data; do not reorder.
    pub fn with_id(
        id: impl Into<String>,
        content: impl Into<String>,
        metadata: Map<String, Value>,
    ) -> Self {
        let content = content.into();

        let mut merged = Map::new();
        merged.insert(
            META_CREATED_AT.to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        merged.insert(
            META_CONTENT_LENGTH.to_string(),
            Value::Number(serde_json::Number::from(content.chars().count() as u64)),
        );
        merged.extend(metadata);

        Self {
            id: id.into(),
            content,
            metadata: merged,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
/// One similarity-search candidate.
pub struct SearchHit {
    /// Document id.
    pub id: String,
    /// Document content.
    pub content: String,
    /// Document metadata.
    pub metadata: Map<String, Value>,
    /// Store-scale similarity (comparable only within one store
    /// implementation and configuration).
    pub similarity: f32,
    /// Store-scale distance (`1 − similarity`).
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Snapshot of index-level statistics.
pub struct IndexStats {
    /// Collection or index name.
    pub name: String,
    /// Number of live documents.
    pub document_count: usize,
    /// Rows occupied in the backing index (may exceed `document_count` in
    /// the fallback store while tombstoned rows await compaction).
    pub index_rows: usize,
    /// Embedding dimension.
    pub dimension: usize,
    /// Active backend, `"qdrant"` or `"flat"`.
    pub backend: &'static str,
}

/// Returns `true` if `metadata` satisfies every `key == value` pair in
/// `filter`.
pub fn matches_filter(metadata: &Map<String, Value>, filter: &MetadataFilter) -> bool {
    filter
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}
