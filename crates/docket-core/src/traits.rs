//! Core traits for docket components.
//!
//! - [`EmbeddingStore`]: persist and load collections
//! - [`Embedder`]: generate vector embeddings
//! - [`Generator`]: optional text completion used to phrase answers
//! - [`DocumentSource`]: producers of raw documents for ingestion
//!
//! Implementations are chosen from configuration and passed around as
//! `Arc<dyn Trait>`.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{EmbedError, GenerateError, StoreError};
use crate::types::{
    CollectionInfo, CollectionSnapshot, EmbeddingConfig, EmbeddingOutput, RawDocument, Record,
    UpsertStats,
};

// ============================================================================
// Vector Storage
// ============================================================================

/// Append-only storage of named collections.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Backend name, for logs and status output.
    fn backend(&self) -> &str;

    /// Append records to a collection, creating it on first use.
    ///
    /// The whole batch is rejected when any record has the wrong dimension,
    /// an invalid embedding, or an id that already exists. A rejected batch
    /// leaves the collection untouched.
    async fn upsert(&self, collection: &str, records: &[Record]) -> Result<UpsertStats, StoreError>;

    /// Load an immutable snapshot. `Ok(None)` means the collection was never written.
    async fn load(&self, collection: &str) -> Result<Option<Arc<CollectionSnapshot>>, StoreError>;

    /// List stored collections.
    async fn collections(&self) -> Result<Vec<CollectionInfo>, StoreError>;
}

// ============================================================================
// Embedding
// ============================================================================

/// Trait for generating embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model name/identifier.
    fn model_name(&self) -> &str;

    /// Embedding dimension.
    fn dimension(&self) -> usize;

    /// Embed text content.
    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError>;

    /// Embed a query (may use different instruction).
    async fn embed_query(
        &self,
        query: &str,
        config: &EmbeddingConfig,
    ) -> Result<EmbeddingOutput, EmbedError> {
        let results = self.embed_text(&[query], config).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Inference("empty embedding result".to_string()))
    }
}

// ============================================================================
// Generation
// ============================================================================

/// External text-completion service.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Model name/identifier.
    fn model_name(&self) -> &str;

    /// Complete a prompt.
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, GenerateError>;
}

// ============================================================================
// Document sources
// ============================================================================

/// Producer of raw documents for ingestion.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Short description for logs.
    fn describe(&self) -> String;

    /// Read every available document.
    async fn documents(&self) -> Result<Vec<RawDocument>, crate::Error>;
}
