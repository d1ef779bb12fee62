//! Text vectorization: encoder, cache, and the embedding service.
//!
//! - [`encoder`] turns text into fixed-dimension vectors (BERT-family model
//!   or a deterministic stub).
//! - [`cache`] persists computed vectors, one file per `(model, text)` key.
//! - [`service`] combines both behind the encode/encode_batch surface used
//!   by the stores and the retriever.

/// Vector cache (disk + in-memory front).
pub mod cache;
/// Device selection (CPU / Metal / CUDA).
pub mod device;
mod error;
/// Sentence encoder.
pub mod encoder;
/// Cached, batched embedding service.
pub mod service;

pub use cache::EmbeddingCache;
pub use encoder::{ENCODER_MAX_SEQ_LEN, Encoder, EncoderConfig};
pub use error::EmbeddingError;
pub use service::{EmbeddingService, ModelInfo, cosine_similarity};
