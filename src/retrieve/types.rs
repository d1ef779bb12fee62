use serde::Serialize;
use serde_json::{Map, Value};

use crate::constants::{DEFAULT_KEYWORD_WEIGHT, DEFAULT_SEMANTIC_WEIGHT};
use crate::store::{MetadataFilter, SearchHit};

#[derive(Debug, Clone, Serialize)]
/// One retrieved chunk: a transient, read-only projection produced per
/// query, never persisted.
pub struct RetrievalResult {
    /// Chunk text.
    pub content: String,
    /// Chunk metadata.
    pub metadata: Map<String, Value>,
    /// Relevance score. Raw store similarity, a reranked blend, or the
    /// sentinel `1.0` for metadata-only retrieval.
    pub similarity: f32,
    /// Source document id.
    pub doc_id: String,
}

impl RetrievalResult {
    pub(crate) fn from_hit(hit: SearchHit) -> Self {
        Self {
            content: hit.content,
            metadata: hit.metadata,
            similarity: hit.similarity,
            doc_id: hit.id,
        }
    }
}

#[derive(Debug, Clone)]
/// Per-call overrides for [`Retriever::retrieve`](super::Retriever::retrieve).
///
/// Every `None` falls back to the configured default for that call only.
pub struct RetrieveOptions {
    /// Number of results to return.
    pub top_k: Option<usize>,
    /// Extra minimum-similarity cutoff applied on top of the store's own.
    pub similarity_threshold: Option<f32>,
    /// Equality-conjunction metadata filter.
    pub metadata_filter: Option<MetadataFilter>,
    /// Whether to rerank an over-fetched candidate set.
    pub rerank: bool,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            top_k: None,
            similarity_threshold: None,
            metadata_filter: None,
            rerank: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
/// Score weights for hybrid retrieval.
pub struct HybridWeights {
    /// Weight of the semantic leg.
    pub semantic: f32,
    /// Weight of the keyword leg.
    pub keyword: f32,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            semantic: DEFAULT_SEMANTIC_WEIGHT,
            keyword: DEFAULT_KEYWORD_WEIGHT,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
/// Summary statistics over one retrieval's result set.
pub struct RetrievalStats {
    /// Number of results.
    pub total_results: usize,
    /// Mean similarity.
    pub avg_similarity: f32,
    /// Highest similarity.
    pub max_similarity: f32,
    /// Lowest similarity.
    pub min_similarity: f32,
    /// Sum of content lengths in characters.
    pub total_content_length: usize,
    /// Mean content length in characters.
    pub avg_content_length: f32,
    /// Distinct `source_file`/`source` metadata values.
    pub unique_sources: usize,
    /// Results with similarity ≥ 0.8.
    pub above_0_8: usize,
    /// Results with similarity ≥ 0.6.
    pub above_0_6: usize,
    /// Results with similarity ≥ 0.4.
    pub above_0_4: usize,
    /// Results with similarity < 0.4.
    pub below_0_4: usize,
}
