//! In-memory store for tests and throwaway sessions.
//!
//! [`MemoryStore`] follows the same contract as [`crate::FlatFileStore`]
//! (validation, append order, generations) without touching disk. Each upsert
//! swaps in a new `Arc<CollectionSnapshot>`, so snapshots already handed to
//! readers are never mutated.

use async_trait::async_trait;
use docket_core::{
    CollectionInfo, CollectionSnapshot, EmbeddingStore, Record, StoreError, UpsertStats,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::validate::{validate_batch, validate_collection_name};

/// In-memory embedding store.
///
/// # Example
///
/// ```rust
/// use docket_core::{EmbeddingStore, Record};
/// use docket_store::MemoryStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::new();
/// store.upsert("notes", &[Record::new("a", vec![1.0, 0.0], "hello")]).await?;
///
/// let snapshot = store.load("notes").await?.expect("written above");
/// assert_eq!(snapshot.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Arc<CollectionSnapshot>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmbeddingStore for MemoryStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, collection: &str, records: &[Record]) -> Result<UpsertStats, StoreError> {
        validate_collection_name(collection)?;

        let mut collections = self.collections.write().await;
        let current = collections.get(collection);

        let existing: HashSet<&str> = current
            .map(|s| s.ids.iter().map(String::as_str).collect())
            .unwrap_or_default();
        let dimension = validate_batch(
            current.map(|s| s.dimension),
            |id| existing.contains(id),
            records,
        )?;

        if records.is_empty() {
            return Ok(UpsertStats {
                inserted: 0,
                total: current.map_or(0, |s| s.len()),
                generation: current.map_or(0, |s| s.generation),
            });
        }

        let mut next = current.map_or_else(
            || CollectionSnapshot::from_records(collection, dimension, 0, &[]),
            |s| (**s).clone(),
        );
        drop(existing);

        for record in records {
            next.ids.push(record.id.clone());
            next.embeddings.extend_from_slice(&record.embedding);
            next.metadatas.push(record.metadata.clone());
            next.documents.push(record.document.clone());
        }
        next.generation += 1;

        let stats = UpsertStats {
            inserted: records.len(),
            total: next.len(),
            generation: next.generation,
        };
        collections.insert(collection.to_string(), Arc::new(next));

        debug!(
            "Upserted {} records into '{}' (total {})",
            stats.inserted, collection, stats.total
        );
        Ok(stats)
    }

    async fn load(&self, collection: &str) -> Result<Option<Arc<CollectionSnapshot>>, StoreError> {
        validate_collection_name(collection)?;
        Ok(self.collections.read().await.get(collection).cloned())
    }

    async fn collections(&self) -> Result<Vec<CollectionInfo>, StoreError> {
        let collections = self.collections.read().await;
        let mut infos: Vec<CollectionInfo> = collections
            .values()
            .map(|s| CollectionInfo {
                name: s.name.clone(),
                records: s.len(),
                dimension: s.dimension,
                generation: s.generation,
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }
}
