//! Cross-cutting, shared constants.
//!
//! Prefer deriving secondary constants from primary ones to avoid drift. The
//! embedding dimension is fixed by the configured encoder at load time; the
//! values here are defaults for the MiniLM-class sentence encoders the engine
//! ships with. Use [`validate_dimension`] at module boundaries to catch
//! mismatches early.

use thiserror::Error;

/// Default sentence-encoder output dimension (MiniLM-class models).
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Byte size of one f32 embedding at the default dimension.
pub const EMBEDDING_F32_BYTES: usize = DEFAULT_EMBEDDING_DIM * 4;

/// Default number of results a retrieval call returns.
pub const DEFAULT_TOP_K: usize = 5;

/// Default minimum similarity for the primary store (distance-derived scale).
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.1;

/// Upper bound on the fallback store's effective threshold.
///
/// The fallback index scores raw inner products over normalized vectors,
/// which live on a different scale than the primary store's distance-derived
/// similarity. Its effective cutoff is `min(FLAT_THRESHOLD_CEILING, configured)`.
pub const FLAT_THRESHOLD_CEILING: f32 = 0.1;

/// Default embedding batch size.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default max entries held by the in-memory embedding cache layer.
pub const DEFAULT_L1_CAPACITY: u64 = 10_000;

/// Chunk length (in characters) the reranker treats as ideal.
pub const TARGET_CHUNK_LEN: usize = 500;

/// Reranking blend weights: similarity, length, freshness, metadata.
pub const RERANK_WEIGHTS: [f32; 4] = [0.6, 0.2, 0.1, 0.1];

/// Default semantic weight for hybrid retrieval.
pub const DEFAULT_SEMANTIC_WEIGHT: f32 = 0.7;

/// Default keyword weight for hybrid retrieval.
pub const DEFAULT_KEYWORD_WEIGHT: f32 = 0.3;

/// Default collection name in the primary store.
pub const DEFAULT_COLLECTION_NAME: &str = "documents";

/// Default Qdrant endpoint URL.
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

#[derive(Debug, Error, PartialEq, Eq)]
/// Errors from [`validate_dimension`].
pub enum DimValidationError {
    /// The dimension was zero.
    #[error("embedding dimension must be non-zero")]
    ZeroDimension,

    /// A vector did not match the expected dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    Mismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },
}

/// Validates that `vector` has exactly `expected` components.
///
/// A mismatch here means two modules disagree about the configured encoder,
/// which is a configuration error rather than a per-call one.
pub fn validate_dimension(expected: usize, vector: &[f32]) -> Result<(), DimValidationError> {
    if expected == 0 {
        return Err(DimValidationError::ZeroDimension);
    }
    if vector.len() != expected {
        return Err(DimValidationError::Mismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}
