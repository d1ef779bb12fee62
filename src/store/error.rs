use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
/// Errors returned by vector store operations.
pub enum StoreError {
    /// Could not connect to the primary backend.
    #[error("failed to connect to vector backend at '{url}': {message}")]
    ConnectionFailed {
        /// Endpoint URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// Collection creation or lookup failed.
    #[error("collection operation failed for '{collection}': {message}")]
    CollectionFailed {
        /// Collection name.
        collection: String,
        /// Error message.
        message: String,
    },

    /// Adding or updating documents failed.
    #[error("failed to upsert documents into '{collection}': {message}")]
    UpsertFailed {
        /// Collection name.
        collection: String,
        /// Error message.
        message: String,
    },

    /// Similarity search failed.
    #[error("failed to search '{collection}': {message}")]
    SearchFailed {
        /// Collection name.
        collection: String,
        /// Error message.
        message: String,
    },

    /// Deletion failed.
    #[error("failed to delete from '{collection}': {message}")]
    DeleteFailed {
        /// Collection name.
        collection: String,
        /// Error message.
        message: String,
    },

    /// Reading or writing the fallback index snapshot failed.
    #[error("failed to persist index state at '{path}': {message}")]
    PersistenceFailed {
        /// Snapshot path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// A vector did not match the index dimension.
    #[error("invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// Embedding a query or document failed.
    #[error("embedding failed: {reason}")]
    EmbeddingFailed {
        /// Error message.
        reason: String,
    },
}
