//! Vector index: one contract, two interchangeable implementations.
//!
//! [`QdrantStore`] delegates to an external similarity-search backend;
//! [`FlatStore`] owns a flat in-memory index with disk persistence. Both sit
//! behind [`DocumentStore`], and [`VectorIndex`] picks one at construction
//! with a capability probe — the choice is fixed for the process lifetime
//! and callers only ever see the shared contract.
//!
//! Similarity values are comparable across calls only within one store
//! implementation and configuration; the two stores score on different
//! scales and their numbers must not be compared against each other.

pub mod error;
pub mod flat;
pub mod model;
pub mod qdrant;

pub use error::StoreError;
pub use flat::FlatStore;
pub use model::{
    Document, IndexStats, META_CONTENT_LENGTH, META_CREATED_AT, MetadataFilter, SearchHit,
    matches_filter,
};
pub use qdrant::QdrantStore;

use tracing::{info, warn};

use crate::config::Config;
use crate::embedding::EmbeddingService;

/// The vector index contract shared by both store implementations.
pub trait DocumentStore: Send + Sync {
    /// Embeds and inserts documents, returning their ids in input order.
    fn add(
        &self,
        documents: Vec<Document>,
    ) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Searches for the `n_results` most similar documents, after dropping
    /// hits below the store's similarity threshold and applying the
    /// equality-conjunction metadata filter.
    fn search(
        &self,
        query: &str,
        n_results: usize,
        filter: Option<&MetadataFilter>,
    ) -> impl Future<Output = Result<Vec<SearchHit>, StoreError>> + Send;

    /// Fetches one document by id (`None` when absent, never an error).
    fn get(&self, id: &str) -> impl Future<Output = Result<Option<Document>, StoreError>> + Send;

    /// Re-embeds and replaces the document stored under `id`.
    ///
    /// Returns `false` when `id` does not exist.
    fn update(
        &self,
        id: &str,
        document: Document,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Deletes one document (`false` when absent, never an error).
    fn delete(&self, id: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Deletes several documents, returning how many existed.
    fn delete_many(&self, ids: &[String])
    -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Lists documents, optionally filtered and capped.
    fn list(
        &self,
        filter: Option<&MetadataFilter>,
        limit: Option<usize>,
    ) -> impl Future<Output = Result<Vec<Document>, StoreError>> + Send;

    /// Counts documents, optionally filtered.
    fn count(
        &self,
        filter: Option<&MetadataFilter>,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Removes every document.
    fn clear(&self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Returns index-level statistics.
    fn stats(&self) -> impl Future<Output = Result<IndexStats, StoreError>> + Send;
}

/// The process-wide vector index, fixed to one backend at construction.
pub enum VectorIndex {
    /// Qdrant adapter (primary).
    Primary(QdrantStore),
    /// Self-managed flat index (fallback).
    Fallback(FlatStore),
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary(store) => f.debug_tuple("Primary").field(store).finish(),
            Self::Fallback(store) => f.debug_tuple("Fallback").field(store).finish(),
        }
    }
}

impl VectorIndex {
    /// Probes the primary backend and falls back to the flat index when it
    /// is unreachable.
    ///
    /// The decision happens once, here; afterwards callers cannot tell which
    /// implementation serves them beyond [`VectorIndex::is_fallback`].
    pub async fn connect(
        config: &Config,
        embeddings: EmbeddingService,
    ) -> Result<Self, StoreError> {
        match QdrantStore::connect(config, embeddings.clone()).await {
            Ok(store) => Ok(Self::Primary(store)),
            Err(e) => {
                warn!(
                    error = %e,
                    "Primary vector store unavailable, using flat fallback index"
                );
                let store = FlatStore::open(
                    config.index_dir(),
                    embeddings,
                    config.similarity_threshold,
                )?;
                info!(dir = %config.index_dir().display(), "Flat fallback index ready");
                Ok(Self::Fallback(store))
            }
        }
    }

    /// Opens the flat index directly, skipping the primary probe.
    pub fn open_fallback(config: &Config, embeddings: EmbeddingService) -> Result<Self, StoreError> {
        Ok(Self::Fallback(FlatStore::open(
            config.index_dir(),
            embeddings,
            config.similarity_threshold,
        )?))
    }

    /// Returns `true` when the fallback store is active.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    /// Rebuilds the fallback arena, reclaiming tombstoned rows.
    ///
    /// The primary backend owns its own deletion; compaction there is a
    /// no-op reporting zero reclaimed rows.
    pub fn compact(&self) -> Result<usize, StoreError> {
        match self {
            Self::Primary(_) => Ok(0),
            Self::Fallback(store) => store.compact(),
        }
    }
}

impl DocumentStore for VectorIndex {
    async fn add(&self, documents: Vec<Document>) -> Result<Vec<String>, StoreError> {
        match self {
            Self::Primary(store) => store.add(documents).await,
            Self::Fallback(store) => store.add(documents).await,
        }
    }

    async fn search(
        &self,
        query: &str,
        n_results: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>, StoreError> {
        match self {
            Self::Primary(store) => store.search(query, n_results, filter).await,
            Self::Fallback(store) => store.search(query, n_results, filter).await,
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        match self {
            Self::Primary(store) => store.get(id).await,
            Self::Fallback(store) => store.get(id).await,
        }
    }

    async fn update(&self, id: &str, document: Document) -> Result<bool, StoreError> {
        match self {
            Self::Primary(store) => store.update(id, document).await,
            Self::Fallback(store) => store.update(id, document).await,
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        match self {
            Self::Primary(store) => store.delete(id).await,
            Self::Fallback(store) => store.delete(id).await,
        }
    }

    async fn delete_many(&self, ids: &[String]) -> Result<usize, StoreError> {
        match self {
            Self::Primary(store) => store.delete_many(ids).await,
            Self::Fallback(store) => store.delete_many(ids).await,
        }
    }

    async fn list(
        &self,
        filter: Option<&MetadataFilter>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        match self {
            Self::Primary(store) => store.list(filter, limit).await,
            Self::Fallback(store) => store.list(filter, limit).await,
        }
    }

    async fn count(&self, filter: Option<&MetadataFilter>) -> Result<usize, StoreError> {
        match self {
            Self::Primary(store) => store.count(filter).await,
            Self::Fallback(store) => store.count(filter).await,
        }
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match self {
            Self::Primary(store) => store.clear().await,
            Self::Fallback(store) => store.clear().await,
        }
    }

    async fn stats(&self) -> Result<IndexStats, StoreError> {
        match self {
            Self::Primary(store) => store.stats().await,
            Self::Fallback(store) => store.stats().await,
        }
    }
}
