//! No-op embedder.
//!
//! Returns zero vectors of a fixed dimension. Useful for exercising ingestion
//! and storage without a model; every similarity score it produces is zero.

use async_trait::async_trait;
use docket_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};

/// Embedder that returns zero vectors.
///
/// # Example
///
/// ```rust
/// use docket_core::{Embedder, EmbeddingConfig};
/// use docket_embed::NoopEmbedder;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let embedder = NoopEmbedder::with_dimension(8);
/// let outputs = embedder.embed_text(&["a", "b"], &EmbeddingConfig::default()).await?;
/// assert_eq!(outputs[1].embedding, vec![0.0; 8]);
/// # Ok(())
/// # }
/// ```
pub struct NoopEmbedder {
    dimension: usize,
}

impl NoopEmbedder {
    /// Create a no-op embedder with the MiniLM dimension (384).
    #[must_use]
    pub fn new() -> Self {
        Self::with_dimension(384)
    }

    #[must_use]
    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for NoopEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for NoopEmbedder {
    fn model_name(&self) -> &str {
        "noop"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        _config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        Ok(texts
            .iter()
            .map(|text| EmbeddingOutput {
                embedding: vec![0.0; self.dimension],
                token_count: text.split_whitespace().count(),
            })
            .collect())
    }
}
