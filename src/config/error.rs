use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
/// Errors raised while loading or validating [`Config`](super::Config).
pub enum ConfigError {
    /// A configured path does not exist.
    #[error("configured path not found: {path}")]
    PathNotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// A path that must be a directory is not one.
    #[error("path is not a directory: {path}")]
    NotADirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// A numeric environment variable failed to parse.
    #[error("invalid value for {var}: '{value}'")]
    InvalidNumber {
        /// Environment variable name.
        var: &'static str,
        /// The unparseable value.
        value: String,
    },

    /// The similarity threshold is outside `[0, 1]`.
    #[error("similarity_threshold must be within [0.0, 1.0], got {value}")]
    InvalidThreshold {
        /// The configured value.
        value: f32,
    },

    /// `top_k` must be positive.
    #[error("top_k must be positive")]
    InvalidTopK,

    /// `batch_size` must be positive.
    #[error("batch_size must be positive")]
    InvalidBatchSize,
}
