//! Ingestion errors.

use docket_core::{EmbedError, StoreError};
use thiserror::Error;

/// Failure while ingesting one document or batch.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("embedding error: {0}")]
    Embed(#[from] EmbedError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Text could not be extracted from one file
    #[error("extraction error: {0}")]
    Extract(String),

    /// The document source could not be read at all
    #[error("source error: {0}")]
    Source(String),
}

impl From<IngestError> for docket_core::Error {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Store(e) => Self::Store(e),
            IngestError::Embed(e) => Self::Embedding(e),
            IngestError::Io(e) => Self::Io(e),
            IngestError::Serialization(e) => Self::Serialization(e),
            IngestError::Extract(msg) | IngestError::Source(msg) => Self::Other(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = IngestError::Source("raw_docs missing".to_string());
        assert_eq!(err.to_string(), "source error: raw_docs missing");
    }

    #[test]
    fn test_into_core_error() {
        let err: docket_core::Error = IngestError::Store(StoreError::DuplicateId("a--0".into())).into();
        assert!(matches!(err, docket_core::Error::Store(StoreError::DuplicateId(_))));
    }
}
