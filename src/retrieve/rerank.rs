//! Second-pass scoring over an over-fetched candidate set.
//!
//! The combined score is a fixed-weight blend of the store similarity with
//! three cheap signals: closeness to the target chunk length, a constant
//! freshness discount for already-processed content, and lexical matches
//! between query tokens and metadata fields. The blend replaces each
//! result's `similarity` before the final sort.

use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::constants::{RERANK_WEIGHTS, TARGET_CHUNK_LEN};

use super::types::RetrievalResult;

/// Metadata key stamped by the ingestion pipeline when a chunk is processed.
pub const META_PROCESSED_AT: &str = "processed_at";

/// Reranks `results` in place by the combined score, descending.
///
/// Never introduces a candidate that was not fetched and never changes the
/// set, only the order and the scores.
pub fn rerank(query: &str, mut results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    for result in &mut results {
        result.similarity = combined_score(query, result);
    }

    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });

    results
}

/// Blends the store similarity with length, freshness, and metadata signals.
pub fn combined_score(query: &str, result: &RetrievalResult) -> f32 {
    let [w_similarity, w_length, w_freshness, w_metadata] = RERANK_WEIGHTS;

    result.similarity * w_similarity
        + length_score(result.content.chars().count()) * w_length
        + freshness_score(&result.metadata) * w_freshness
        + metadata_relevance(query, &result.metadata) * w_metadata
}

/// Penalizes deviation from the target chunk length, clamped to `[0.1, 1.0]`.
pub fn length_score(content_length: usize) -> f32 {
    let target = TARGET_CHUNK_LEN as f32;
    let score = 1.0 - (content_length as f32 - target).abs() / target;
    score.clamp(0.1, 1.0)
}

/// Constant discount for chunks carrying a processing timestamp.
///
/// A simplified recency proxy, not a true decay function: 0.8 when
/// `processed_at` is present, neutral 1.0 otherwise.
pub fn freshness_score(metadata: &Map<String, Value>) -> f32 {
    if metadata.contains_key(META_PROCESSED_AT) {
        0.8
    } else {
        1.0
    }
}

/// Rewards lexical matches between query tokens and metadata fields.
///
/// File-name matches score 0.3, source matches 0.2, text-like file types
/// 0.1, and earlier chunks within their source document earn a position
/// bonus up to 0.2. The total is capped at 1.0.
pub fn metadata_relevance(query: &str, metadata: &Map<String, Value>) -> f32 {
    let mut score = 0.0f32;
    let query_lower = query.to_lowercase();
    let query_words: Vec<&str> = query_lower.split_whitespace().collect();

    if let Some(file_name) = metadata.get("file_name").and_then(Value::as_str) {
        let file_name = file_name.to_lowercase();
        if query_words.iter().any(|word| file_name.contains(word)) {
            score += 0.3;
        }
    }

    if let Some(source) = metadata.get("source").and_then(Value::as_str) {
        let source = source.to_lowercase();
        if query_words.iter().any(|word| source.contains(word)) {
            score += 0.2;
        }
    }

    if let Some(file_type) = metadata.get("file_type").and_then(Value::as_str) {
        if matches!(file_type.to_lowercase().as_str(), ".txt" | ".md" | ".markdown") {
            score += 0.1;
        }
    }

    let chunk_index = metadata.get("chunk_index").and_then(Value::as_u64);
    let total_chunks = metadata.get("total_chunks").and_then(Value::as_u64);
    if let (Some(chunk_index), Some(total_chunks)) = (chunk_index, total_chunks) {
        if total_chunks > 1 {
            let position_score = 1.0 - (chunk_index as f32 / total_chunks as f32);
            score += position_score * 0.2;
        }
    }

    score.min(1.0)
}
