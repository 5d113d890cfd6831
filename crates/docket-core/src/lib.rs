//! # docket-core
//!
//! Core types and traits for docket, a small embedded vector store that answers
//! questions over a folder of documents.
//!
//! This crate provides the foundational abstractions used throughout docket:
//!
//! - **Vector Storage**: [`EmbeddingStore`] trait for persisting and loading collections
//! - **Embedding Generation**: [`Embedder`] trait for converting text to vectors
//! - **Answer Generation**: [`Generator`] trait for the optional text-completion service
//! - **Document Sources**: [`DocumentSource`] trait for producers of raw documents
//!
//! ## Architecture
//!
//! ```text
//! DocumentSource → chunk → Embedder → EmbeddingStore
//!                                          ↓
//!        query → Embedder → search → Filter → Assembler (→ Generator) → Answer
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Record`] | One embedded chunk with metadata and text |
//! | [`CollectionSnapshot`] | Immutable view of a persisted collection |
//! | [`Filter`] | Post-retrieval path / extension / date constraints |
//! | [`ResolvedContext`] | A ranked record that survived filtering |
//! | [`Answer`] | Final answer text plus the contexts it was built from |
//!
//! ## Related Crates
//!
//! - `docket-store`: flat-file and in-memory [`EmbeddingStore`] implementations
//! - `docket-embed`: embedder pool and embedder implementations
//! - `docket-query`: similarity search, filtering and retrieval
//! - `docket-answer`: prompt building, extractive summaries and generators
//! - `docket-ingest`: chunking and ingestion of raw documents

pub mod error;
pub mod traits;
pub mod types;

pub use error::{EmbedError, Error, GenerateError, Result, StoreError};
pub use traits::*;
pub use types::*;
