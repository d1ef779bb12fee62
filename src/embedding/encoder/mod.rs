//! Sentence encoder (BERT-family safetensors + tokenizer).
//!
//! Use [`EncoderConfig::stub`] for tests/examples without model files.

/// Encoder configuration.
pub mod config;


pub use config::{ENCODER_MAX_SEQ_LEN, EncoderConfig};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::constants::DEFAULT_EMBEDDING_DIM;
use crate::embedding::device::select_device;
use crate::embedding::error::EmbeddingError;

enum EncoderBackend {
    Model {
        model: Arc<Mutex<BertModel>>,
        tokenizer: Arc<tokenizers::Tokenizer>,
        device: Device,
        hidden_size: usize,
    },
    Stub,
}

/// Sentence embedding generator (supports stub mode).
///
/// The model is wrapped in a mutex: the underlying transformer is not assumed
/// safe for concurrent mutation, so concurrent encode calls serialize here.
pub struct Encoder {
    backend: EncoderBackend,
    config: EncoderConfig,
    invocations: AtomicU64,
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field(
                "backend",
                &match &self.backend {
                    EncoderBackend::Model { device, .. } => format!("Model({device:?})"),
                    EncoderBackend::Stub => "Stub".to_string(),
                },
            )
            .field("model_id", &self.config.model_id)
            .field("dimension", &self.dimension())
            .finish()
    }
}

impl Encoder {
    /// Loads the encoder from a config (stub mode is supported).
    ///
    /// Model-loading failures (missing weights, bad config) are fatal here,
    /// at construction, not per call.
    pub fn load(config: EncoderConfig) -> Result<Self, EmbeddingError> {
        config.validate()?;

        if config.testing_stub {
            warn!("Encoder running in STUB mode (testing only)");
            return Ok(Self {
                backend: EncoderBackend::Stub,
                config,
                invocations: AtomicU64::new(0),
            });
        }

        let device = select_device()?;
        debug!(?device, "Selected compute device for encoder");

        let (model, tokenizer, hidden_size) = Self::load_model(&config, &device)?;

        info!(
            model_id = %config.model_id,
            model_dir = %config.model_dir.display(),
            hidden_size,
            max_seq_len = config.max_seq_len,
            "Sentence encoder loaded"
        );

        Ok(Self {
            backend: EncoderBackend::Model {
                model: Arc::new(Mutex::new(model)),
                tokenizer: Arc::new(tokenizer),
                device,
                hidden_size,
            },
            config,
            invocations: AtomicU64::new(0),
        })
    }

    fn load_model(
        config: &EncoderConfig,
        device: &Device,
    ) -> Result<(BertModel, tokenizers::Tokenizer, usize), EmbeddingError> {
        let tokenizer = tokenizers::Tokenizer::from_file(config.tokenizer_path()).map_err(|e| {
            EmbeddingError::TokenizationFailed {
                reason: format!("failed to load tokenizer: {e}"),
            }
        })?;

        let config_content = std::fs::read_to_string(config.config_path())?;
        let bert_config: BertConfig =
            serde_json::from_str(&config_content).map_err(|e| EmbeddingError::ModelLoadFailed {
                reason: format!("failed to parse transformer config: {e}"),
            })?;

        let weights_path = config.weights_path();
        if !weights_path.exists() {
            return Err(EmbeddingError::ModelNotFound { path: weights_path });
        }

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)?
        };

        let hidden_size = bert_config.hidden_size;
        let model =
            BertModel::load(vb, &bert_config).map_err(|e| EmbeddingError::ModelLoadFailed {
                reason: format!("failed to load BERT weights: {e}"),
            })?;

        Ok((model, tokenizer, hidden_size))
    }

    /// Generates an embedding for a single string.
    pub fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.invocations.fetch_add(1, Ordering::Relaxed);

        match &self.backend {
            EncoderBackend::Model {
                model,
                tokenizer,
                device,
                ..
            } => self.encode_with_model(text, model, tokenizer, device),
            EncoderBackend::Stub => Ok(self.encode_stub(text)),
        }
    }

    /// Generates embeddings for a batch of strings, preserving input order.
    pub fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.encode(text)).collect()
    }

    fn encode_with_model(
        &self,
        text: &str,
        model: &Arc<Mutex<BertModel>>,
        tokenizer: &tokenizers::Tokenizer,
        device: &Device,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let encoding =
            tokenizer
                .encode(text, true)
                .map_err(|e| EmbeddingError::TokenizationFailed {
                    reason: e.to_string(),
                })?;

        let mut tokens: Vec<u32> = encoding.get_ids().to_vec();
        if tokens.is_empty() {
            return Ok(vec![0.0; self.dimension()]);
        }

        if tokens.len() > self.config.max_seq_len {
            tokens.truncate(self.config.max_seq_len);
        }

        debug!(
            text_len = text.len(),
            token_count = tokens.len(),
            "Generating embedding"
        );

        let input_ids = Tensor::new(&tokens[..], device)?.unsqueeze(0)?;
        let token_type_ids = input_ids.zeros_like()?;

        // Single-text forward pass; no padding means the attention mask is
        // implicit (all ones), so it is omitted.
        let hidden_states = {
            let model = model.lock();
            model.forward(&input_ids, &token_type_ids, None)?
        };

        // Mean pooling over the sequence dimension:
        // [1, seq_len, hidden] -> [1, hidden] -> [hidden]
        let pooled = hidden_states.mean(1)?.squeeze(0)?;
        let embedding = pooled.to_vec1::<f32>()?;

        Ok(embedding)
    }

    /// Deterministic stub embedding: token-level feature hashing.
    ///
    /// Each lowercased alphanumeric token is hashed to one component of the
    /// vector, and the result is L2-normalized. Texts sharing tokens overlap
    /// in the hashed space, so lexical similarity shows up as cosine
    /// similarity without any model files.
    fn encode_stub(&self, text: &str) -> Vec<f32> {
        use std::hash::{DefaultHasher, Hash, Hasher};

        let dim = self.dimension();
        let mut embedding = vec![0.0f32; dim];

        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let seed = hasher.finish();

            let bucket = (seed % dim as u64) as usize;
            let sign = if seed & (1 << 63) == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }

        embedding
    }

    /// Returns the output embedding dimension.
    ///
    /// Fixed at load time: the transformer's hidden size, or the default
    /// dimension in stub mode.
    pub fn dimension(&self) -> usize {
        match &self.backend {
            EncoderBackend::Model { hidden_size, .. } => *hidden_size,
            EncoderBackend::Stub => DEFAULT_EMBEDDING_DIM,
        }
    }

    /// Returns `true` if running in stub mode.
    pub fn is_stub(&self) -> bool {
        matches!(self.backend, EncoderBackend::Stub)
    }

    /// Number of model invocations so far (cache hits never increment it).
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    /// Returns the encoder configuration.
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }
}
