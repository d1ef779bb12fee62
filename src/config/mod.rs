//! Environment-backed configuration.
//!
//! Most settings have defaults. Override with `QUARRY_*` environment
//! variables. All values are read once at construction; retrieval calls may
//! shadow `top_k` and `similarity_threshold` per call.

pub mod error;


pub use error::ConfigError;

use std::env;
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_COLLECTION_NAME, DEFAULT_L1_CAPACITY, DEFAULT_QDRANT_URL,
    DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_K,
};

/// Retrieval engine configuration loaded from environment variables.
///
/// Use [`Config::from_env`] to read `QUARRY_*` overrides on top of defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identifier of the sentence encoder. Namespaces the embedding cache.
    /// Default: `all-MiniLM-L6-v2`.
    pub embedding_model: String,

    /// Directory holding `model.safetensors`, `config.json` and
    /// `tokenizer.json` for the encoder. `None` runs the deterministic stub
    /// encoder (tests, model-less environments).
    pub model_dir: Option<PathBuf>,

    /// Qdrant endpoint URL for the primary store. Default: `http://localhost:6334`.
    pub qdrant_url: String,

    /// Collection name in the primary store. Default: `documents`.
    pub collection_name: String,

    /// Root directory for persistent state (embedding cache, fallback index).
    /// Default: `./data`.
    pub data_dir: PathBuf,

    /// Default number of results per retrieval. Default: `5`.
    pub top_k: usize,

    /// Minimum similarity for search results. Default: `0.1`.
    pub similarity_threshold: f32,

    /// Embedding batch size. Default: `32`.
    pub batch_size: usize,

    /// Whether the embedding cache is enabled. Default: `true`.
    pub enable_cache: bool,

    /// Max entries in the in-memory embedding cache layer. Default: `10_000`.
    pub l1_capacity: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            model_dir: None,
            qdrant_url: DEFAULT_QDRANT_URL.to_string(),
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            data_dir: PathBuf::from("./data"),
            top_k: DEFAULT_TOP_K,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            batch_size: DEFAULT_BATCH_SIZE,
            enable_cache: true,
            l1_capacity: DEFAULT_L1_CAPACITY,
        }
    }
}

impl Config {
    const ENV_EMBEDDING_MODEL: &'static str = "QUARRY_EMBEDDING_MODEL";
    const ENV_MODEL_DIR: &'static str = "QUARRY_MODEL_DIR";
    const ENV_QDRANT_URL: &'static str = "QUARRY_QDRANT_URL";
    const ENV_COLLECTION_NAME: &'static str = "QUARRY_COLLECTION_NAME";
    const ENV_DATA_DIR: &'static str = "QUARRY_DATA_DIR";
    const ENV_TOP_K: &'static str = "QUARRY_TOP_K";
    const ENV_SIMILARITY_THRESHOLD: &'static str = "QUARRY_SIMILARITY_THRESHOLD";
    const ENV_BATCH_SIZE: &'static str = "QUARRY_BATCH_SIZE";
    const ENV_ENABLE_CACHE: &'static str = "QUARRY_ENABLE_CACHE";
    const ENV_L1_CAPACITY: &'static str = "QUARRY_L1_CAPACITY";

    /// Loads configuration from environment variables (falling back to defaults).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            embedding_model: Self::parse_string_from_env(
                Self::ENV_EMBEDDING_MODEL,
                defaults.embedding_model,
            ),
            model_dir: Self::parse_optional_path_from_env(Self::ENV_MODEL_DIR),
            qdrant_url: Self::parse_string_from_env(Self::ENV_QDRANT_URL, defaults.qdrant_url),
            collection_name: Self::parse_string_from_env(
                Self::ENV_COLLECTION_NAME,
                defaults.collection_name,
            ),
            data_dir: Self::parse_path_from_env(Self::ENV_DATA_DIR, defaults.data_dir),
            top_k: Self::parse_usize_from_env(Self::ENV_TOP_K, defaults.top_k)?,
            similarity_threshold: Self::parse_f32_from_env(
                Self::ENV_SIMILARITY_THRESHOLD,
                defaults.similarity_threshold,
            )?,
            batch_size: Self::parse_usize_from_env(Self::ENV_BATCH_SIZE, defaults.batch_size)?,
            enable_cache: Self::parse_bool_from_env(Self::ENV_ENABLE_CACHE, defaults.enable_cache),
            l1_capacity: Self::parse_u64_from_env(Self::ENV_L1_CAPACITY, defaults.l1_capacity),
        })
    }

    /// Validates basic invariants (does not create directories).
    ///
    /// Configuration errors are fatal at startup: the engine refuses to
    /// construct rather than degrade silently.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::InvalidThreshold {
                value: self.similarity_threshold,
            });
        }

        if self.top_k == 0 {
            return Err(ConfigError::InvalidTopK);
        }

        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }

        if self.data_dir.exists() && !self.data_dir.is_dir() {
            return Err(ConfigError::NotADirectory {
                path: self.data_dir.clone(),
            });
        }

        if let Some(ref dir) = self.model_dir {
            if !dir.exists() {
                return Err(ConfigError::PathNotFound { path: dir.clone() });
            }
            if !dir.is_dir() {
                return Err(ConfigError::NotADirectory { path: dir.clone() });
            }
        }

        Ok(())
    }

    /// Directory for the on-disk embedding cache.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("embedding_cache")
    }

    /// Directory for the fallback index snapshot.
    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("flat_index")
    }

    fn parse_string_from_env(var_name: &str, default: String) -> String {
        env::var(var_name).unwrap_or(default)
    }

    fn parse_path_from_env(var_name: &str, default: PathBuf) -> PathBuf {
        env::var(var_name).map(PathBuf::from).unwrap_or(default)
    }

    fn parse_optional_path_from_env(var_name: &str) -> Option<PathBuf> {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    fn parse_usize_from_env(var_name: &'static str, default: usize) -> Result<usize, ConfigError> {
        match env::var(var_name) {
            Ok(value) => value.parse().map_err(|_| ConfigError::InvalidNumber {
                var: var_name,
                value,
            }),
            Err(_) => Ok(default),
        }
    }

    fn parse_f32_from_env(var_name: &'static str, default: f32) -> Result<f32, ConfigError> {
        match env::var(var_name) {
            Ok(value) => value.parse().map_err(|_| ConfigError::InvalidNumber {
                var: var_name,
                value,
            }),
            Err(_) => Ok(default),
        }
    }

    fn parse_bool_from_env(var_name: &str, default: bool) -> bool {
        env::var(var_name)
            .ok()
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(default)
    }

    fn parse_u64_from_env(var_name: &str, default: u64) -> u64 {
        env::var(var_name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}
