//! Quarry: embedding-indexed retrieval engine.
//!
//! Retrieves semantically relevant text chunks for a query and assembles
//! ordered results for downstream generation. The crate covers the embedding
//! cache, the vector index (a Qdrant-backed primary store with a
//! self-managed flat fallback index), and the retriever's scoring, reranking
//! and hybrid-merge logic. Text extraction, chunk splitting, prompt
//! construction and the HTTP surface are external collaborators.
//!
//! # Public API Surface
//!
//! ## Core Types
//! - [`Config`], [`ConfigError`] - Engine configuration
//! - [`Document`], [`SearchHit`], [`IndexStats`] - Store data model
//! - [`Engine`], [`EngineError`] - Construction wiring and document ops
//!
//! ## Embedding
//! - [`EmbeddingService`], [`EmbeddingError`] - Cached, batched encoding
//! - [`Encoder`], [`EncoderConfig`] - Sentence encoder (model or stub)
//! - [`EmbeddingCache`] - Disk cache with an in-memory front
//!
//! ## Vector Index
//! - [`DocumentStore`] - The shared store contract
//! - [`VectorIndex`] - Primary/fallback selection, fixed at construction
//! - [`QdrantStore`], [`FlatStore`] - The two implementations
//!
//! ## Retrieval
//! - [`Retriever`], [`RetrieveOptions`], [`RetrievalResult`] - Query surface
//! - [`HybridWeights`] - Semantic/keyword score blending

pub mod config;
pub mod constants;
pub mod embedding;
pub mod engine;
pub mod hashing;
pub mod retrieve;
pub mod store;

pub use config::{Config, ConfigError};
pub use constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_COLLECTION_NAME, DEFAULT_EMBEDDING_DIM, DEFAULT_QDRANT_URL,
    DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_K, DimValidationError, FLAT_THRESHOLD_CEILING,
    validate_dimension,
};
pub use embedding::{
    EmbeddingCache, EmbeddingError, EmbeddingService, Encoder, EncoderConfig, ModelInfo,
    cosine_similarity,
};
pub use engine::{Engine, EngineError};
pub use hashing::{hash_embedding_key, key_to_hex};
pub use retrieve::{
    HybridWeights, META_PROCESSED_AT, RetrievalResult, RetrievalStats, RetrieveOptions, Retriever,
};
pub use store::{
    Document, DocumentStore, FlatStore, IndexStats, META_CONTENT_LENGTH, META_CREATED_AT,
    MetadataFilter, QdrantStore, SearchHit, StoreError, VectorIndex, matches_filter,
};
