//! Embedding storage for docket.
//!
//! This crate provides the storage backends for docket, implementing the
//! [`EmbeddingStore`](docket_core::EmbeddingStore) trait.
//!
//! # Backends
//!
//! - [`FlatFileStore`]: one directory per collection holding `meta.json` and a
//!   binary embeddings matrix. Writes are published with a temp-file + rename
//!   of `meta.json`, so concurrent readers never see a half-written collection.
//! - [`MemoryStore`]: process-local store with the same semantics, for tests
//!   and throwaway sessions.
//!
//! Both reject a whole batch on dimension mismatch, invalid vectors or
//! duplicate ids.
//!
//! # Example
//!
//! ```rust,ignore
//! use docket_store::FlatFileStore;
//! use docket_core::{EmbeddingStore, Record};
//!
//! let store = FlatFileStore::new("data/vector_store".into());
//! store.upsert("court-files", &records).await?;
//!
//! if let Some(snapshot) = store.load("court-files").await? {
//!     println!("{} records", snapshot.len());
//! }
//! ```

pub mod atomic;
pub mod flat;
pub mod matrix;
pub mod memory;
mod validate;

pub use flat::FlatFileStore;
pub use memory::MemoryStore;
pub use validate::validate_collection_name;
