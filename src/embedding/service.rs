//! Embedding service: cached, batched text vectorization.
//!
//! Wraps the [`Encoder`] with the two-layer [`EmbeddingCache`] and exposes
//! sync and async encode surfaces. The service is a cheap-to-clone handle;
//! clones share the encoder and cache.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Config;
use crate::embedding::cache::EmbeddingCache;
use crate::embedding::encoder::{Encoder, EncoderConfig};
use crate::embedding::error::EmbeddingError;

/// Descriptive information about the loaded encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    /// Configured model identifier.
    pub model_id: String,
    /// Output embedding dimension.
    pub dimension: usize,
    /// Whether the deterministic stub backend is active.
    pub stub: bool,
}

struct ServiceInner {
    encoder: Encoder,
    cache: Option<EmbeddingCache>,
    batch_size: usize,
}

/// Service for generating text embeddings.
#[derive(Clone)]
pub struct EmbeddingService {
    inner: Arc<ServiceInner>,
}

impl std::fmt::Debug for EmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingService")
            .field("encoder", &self.inner.encoder)
            .field("cached", &self.inner.cache.is_some())
            .field("batch_size", &self.inner.batch_size)
            .finish()
    }
}

impl EmbeddingService {
    /// Builds the service from configuration.
    ///
    /// Loads the encoder eagerly so concurrent first callers never race to
    /// load the model; a load failure is fatal here rather than per call.
    pub fn new(config: &Config) -> Result<Self, EmbeddingError> {
        let encoder_config = match &config.model_dir {
            Some(dir) => EncoderConfig::new(&config.embedding_model, dir.clone()),
            None => EncoderConfig {
                model_id: config.embedding_model.clone(),
                ..EncoderConfig::stub()
            },
        };

        let encoder = Encoder::load(encoder_config)?;

        let cache = if config.enable_cache {
            let dir = config.cache_dir();
            Some(Self::open_cache(
                dir,
                &config.embedding_model,
                encoder.dimension(),
                config.l1_capacity,
            )?)
        } else {
            None
        };

        info!(
            model_id = %config.embedding_model,
            dimension = encoder.dimension(),
            cached = cache.is_some(),
            "Embedding service ready"
        );

        Ok(Self {
            inner: Arc::new(ServiceInner {
                encoder,
                cache,
                batch_size: config.batch_size,
            }),
        })
    }

    fn open_cache(
        dir: PathBuf,
        model_id: &str,
        dimension: usize,
        capacity: u64,
    ) -> Result<EmbeddingCache, EmbeddingError> {
        EmbeddingCache::new(dir.clone(), model_id, dimension, capacity).map_err(|e| {
            EmbeddingError::CacheUnavailable {
                path: dir,
                reason: e.to_string(),
            }
        })
    }

    /// Generates an embedding for a single text.
    ///
    /// Deterministic for a fixed model: a cached vector is returned as-is,
    /// otherwise the encoder runs once and the result is stored before
    /// returning.
    pub fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if let Some(cache) = &self.inner.cache {
            if let Some(hit) = cache.get(text) {
                return Ok(hit);
            }
        }

        let vector = self.inner.encoder.encode(text)?;

        if let Some(cache) = &self.inner.cache {
            cache.put(text, &vector);
        }

        Ok(vector)
    }

    /// Generates embeddings for multiple texts, preserving input order.
    ///
    /// Inputs are partitioned into cached and uncached; only the uncached
    /// subset reaches the encoder, grouped into batches of the configured
    /// size. Entries cached before the call are never re-encoded by it.
    pub fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut embeddings: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut uncached_texts: Vec<&str> = Vec::new();
        let mut uncached_indices: Vec<usize> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let cached = self.inner.cache.as_ref().and_then(|c| c.get(text));
            match cached {
                Some(vector) => embeddings.push(Some(vector)),
                None => {
                    embeddings.push(None);
                    uncached_texts.push(text);
                    uncached_indices.push(i);
                }
            }
        }

        if !uncached_texts.is_empty() {
            debug!(
                total = texts.len(),
                uncached = uncached_texts.len(),
                "Encoding uncached batch entries"
            );

            for (batch_start, batch) in uncached_texts
                .chunks(self.inner.batch_size)
                .scan(0usize, |offset, chunk| {
                    let start = *offset;
                    *offset += chunk.len();
                    Some((start, chunk))
                })
            {
                let batch_embeddings = self.inner.encoder.encode_batch(batch)?;

                for (j, vector) in batch_embeddings.into_iter().enumerate() {
                    if let Some(cache) = &self.inner.cache {
                        cache.put(batch[j], &vector);
                    }
                    embeddings[uncached_indices[batch_start + j]] = Some(vector);
                }
            }
        }

        // Every slot was filled from cache or from its batch above.
        Ok(embeddings.into_iter().flatten().collect())
    }

    /// Async variant of [`encode`](Self::encode).
    ///
    /// Delegates the blocking model call to a worker thread so the caller's
    /// scheduler thread is never blocked.
    pub async fn encode_async(&self, text: String) -> Result<Vec<f32>, EmbeddingError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.encode(&text))
            .await
            .map_err(|e| EmbeddingError::InferenceFailed {
                reason: format!("embedding worker failed: {e}"),
            })?
    }

    /// Async variant of [`encode_batch`](Self::encode_batch).
    pub async fn encode_batch_async(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            service.encode_batch(&refs)
        })
        .await
        .map_err(|e| EmbeddingError::InferenceFailed {
            reason: format!("embedding worker failed: {e}"),
        })?
    }

    /// Returns the embedding dimension of the configured model.
    pub fn dimension(&self) -> usize {
        self.inner.encoder.dimension()
    }

    /// Number of encoder invocations so far (cache hits never count).
    pub fn encoder_invocations(&self) -> u64 {
        self.inner.encoder.invocations()
    }

    /// Returns information about the loaded model.
    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_id: self.inner.encoder.config().model_id.clone(),
            dimension: self.dimension(),
            stub: self.inner.encoder.is_stub(),
        }
    }

    /// Drops every cached embedding (no-op when caching is disabled).
    pub fn clear_cache(&self) -> Result<(), EmbeddingError> {
        if let Some(cache) = &self.inner.cache {
            cache.clear().map_err(|e| EmbeddingError::CacheUnavailable {
                path: cache.dir().to_path_buf(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

/// Cosine similarity of two vectors.
///
/// Returns `0.0` (not an error) when either vector has zero norm, so callers
/// never trip over a division by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_service(data_dir: &std::path::Path, enable_cache: bool) -> EmbeddingService {
        let config = Config {
            data_dir: data_dir.to_path_buf(),
            enable_cache,
            ..Config::default()
        };
        EmbeddingService::new(&config).expect("stub service should construct")
    }

    #[test]
    fn test_encode_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let service = stub_service(tmp.path(), true);

        let first = service.encode("repeatable text").unwrap();
        let second = service.encode("repeatable text").unwrap();

        assert_eq!(
            first.iter().map(|f| f.to_bits()).collect::<Vec<_>>(),
            second.iter().map(|f| f.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_batch_matches_single_encoding() {
        let tmp = tempfile::tempdir().unwrap();
        let service = stub_service(tmp.path(), true);

        let single = service.encode("only text").unwrap();
        let batch = service.encode_batch(&["only text"]).unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0], single);
    }

    #[test]
    fn test_batch_preserves_order_with_mixed_cache_state() {
        let tmp = tempfile::tempdir().unwrap();
        let service = stub_service(tmp.path(), true);

        // Warm the cache for the middle entry only.
        let warm = service.encode("second").unwrap();

        let batch = service
            .encode_batch(&["first", "second", "third"])
            .unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0], service.encode("first").unwrap());
        assert_eq!(batch[1], warm);
        assert_eq!(batch[2], service.encode("third").unwrap());
    }

    #[test]
    fn test_encode_works_with_cache_disabled() {
        let tmp = tempfile::tempdir().unwrap();
        let service = stub_service(tmp.path(), false);

        let a = service.encode("uncached path").unwrap();
        let b = service.encode("uncached path").unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), service.dimension());
    }

    #[tokio::test]
    async fn test_async_encode_matches_sync() {
        let tmp = tempfile::tempdir().unwrap();
        let service = stub_service(tmp.path(), true);

        let sync = service.encode("async parity").unwrap();
        let via_worker = service.encode_async("async parity".to_string()).await.unwrap();

        assert_eq!(sync, via_worker);
    }

    #[tokio::test]
    async fn test_async_batch_matches_sync() {
        let tmp = tempfile::tempdir().unwrap();
        let service = stub_service(tmp.path(), true);

        let sync = service.encode_batch(&["a", "b"]).unwrap();
        let via_worker = service
            .encode_batch_async(vec!["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert_eq!(sync, via_worker);
    }

    #[test]
    fn test_cosine_similarity_of_identical_vectors() {
        let v = vec![0.3, -0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_norm_is_zero_not_error() {
        let zero = vec![0.0, 0.0, 0.0];
        let v = vec![1.0, 2.0, 3.0];

        assert_eq!(cosine_similarity(&zero, &v), 0.0);
        assert_eq!(cosine_similarity(&v, &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn test_model_info_reports_stub_backend() {
        let tmp = tempfile::tempdir().unwrap();
        let service = stub_service(tmp.path(), true);

        let info = service.model_info();
        assert_eq!(info.model_id, "all-MiniLM-L6-v2");
        assert_eq!(info.dimension, service.dimension());
        assert!(info.stub);
    }

    #[test]
    fn test_clear_cache_forces_recomputation_to_identical_vector() {
        let tmp = tempfile::tempdir().unwrap();
        let service = stub_service(tmp.path(), true);

        let before = service.encode("stable").unwrap();
        service.clear_cache().unwrap();
        let after = service.encode("stable").unwrap();

        assert_eq!(before, after);
    }
}
