//! Retrieval: store → similarity search → metadata filter.

use docket_core::{EmbeddingStore, Error, Filter, ResolvedContext};
use docket_embed::EmbedderPool;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::filter::{FilterExt, MtimeResolver};
use crate::similarity::search;

/// Result of one retrieval.
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    /// The embedded query
    pub query_embedding: Vec<f32>,
    /// Ranked candidates before filtering
    pub candidates: Vec<ResolvedContext>,
    /// Candidates that passed the filter, at most `top_k`
    pub contexts: Vec<ResolvedContext>,
}

/// Runs queries against one store.
pub struct Retriever {
    store: Arc<dyn EmbeddingStore>,
    embedder: Arc<EmbedderPool>,
    resolver: Arc<MtimeResolver>,
    candidate_multiplier: usize,
}

impl Retriever {
    /// `candidate_multiplier` widens the similarity search so that filtering
    /// still leaves up to `top_k` contexts. `1` searches exactly `top_k`.
    pub fn new(
        store: Arc<dyn EmbeddingStore>,
        embedder: Arc<EmbedderPool>,
        resolver: MtimeResolver,
        candidate_multiplier: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            resolver: Arc::new(resolver),
            candidate_multiplier: candidate_multiplier.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn EmbeddingStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<EmbedderPool> {
        &self.embedder
    }

    /// Embed `query` once and retrieve with it.
    ///
    /// Only an embedding failure is an error; everything after degrades to an
    /// empty result.
    pub async fn retrieve(
        &self,
        collection: &str,
        query: &str,
        top_k: usize,
        filter: &Filter,
    ) -> Result<Retrieval, Error> {
        debug!("Retrieving from '{}': {}", collection, query);
        let embedding = self.embedder.embed_query(query).await?.embedding;
        Ok(self
            .retrieve_embedding(collection, embedding, top_k, filter)
            .await)
    }

    /// Retrieve with a precomputed query embedding.
    pub async fn retrieve_embedding(
        &self,
        collection: &str,
        query_embedding: Vec<f32>,
        top_k: usize,
        filter: &Filter,
    ) -> Retrieval {
        let snapshot = match self.store.load(collection).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!("Collection '{}' does not exist", collection);
                return Retrieval {
                    query_embedding,
                    ..Retrieval::default()
                };
            }
            Err(e) => {
                warn!("Failed to load collection '{}': {}", collection, e);
                return Retrieval {
                    query_embedding,
                    ..Retrieval::default()
                };
            }
        };

        let wanted = top_k.saturating_mul(self.candidate_multiplier);
        let candidates: Vec<ResolvedContext> = search(&snapshot, &query_embedding, wanted)
            .into_iter()
            .enumerate()
            .map(|(i, c)| snapshot.context(c.row, i + 1, c.score))
            .collect();

        let mut contexts = if filter.has_date_window() {
            // Date resolution stats files and reads side files.
            let filter = filter.clone();
            let resolver = Arc::clone(&self.resolver);
            let input = candidates.clone();
            match tokio::task::spawn_blocking(move || filter.apply(input, &resolver)).await {
                Ok(contexts) => contexts,
                Err(e) => {
                    warn!("Filter task failed: {}", e);
                    Vec::new()
                }
            }
        } else {
            filter.apply(candidates.clone(), &self.resolver)
        };
        contexts.truncate(top_k);

        debug!(
            "Retrieved {} candidates, {} after filtering",
            candidates.len(),
            contexts.len()
        );
        Retrieval {
            query_embedding,
            candidates,
            contexts,
        }
    }
}
