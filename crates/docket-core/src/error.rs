//! Error types for docket.

use thiserror::Error;

/// Main error type for docket operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Vector store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Embedding generation failed
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbedError),

    /// Text generation failed
    #[error("generation error: {0}")]
    Generation(#[from] GenerateError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A filter value could not be parsed
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Embedding store errors.
///
/// A missing collection is not an error: [`crate::EmbeddingStore::load`]
/// returns `Ok(None)` for it.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("dimension mismatch for record {id}: collection has {expected}, got {actual}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate record id: {0}")]
    DuplicateId(String),

    #[error("invalid embedding for record {id}: {reason}")]
    InvalidEmbedding { id: String, reason: String },

    #[error("invalid collection name: {0:?}")]
    InvalidCollectionName(String),

    #[error("corrupt collection {collection}: {reason}")]
    Corrupt { collection: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

/// Embedding errors.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("model loading failed: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("embedding request failed: {0}")]
    Request(String),
}

/// Failures reported by a [`crate::Generator`].
///
/// Callers decide whether to fall back by matching on the variant, never by
/// inspecting message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerateError {
    #[error("quota exceeded")]
    QuotaExceeded,

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("generation timed out")]
    Timeout,

    #[error("generation failed: {0}")]
    Other(String),
}

/// Result type alias for docket operations.
pub type Result<T> = std::result::Result<T, Error>;
