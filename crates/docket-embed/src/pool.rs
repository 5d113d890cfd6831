//! Shared embedder handle with bounded concurrency.

use docket_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// The process-wide embedder.
///
/// Built once at start-up and shared as `Arc<EmbedderPool>`. Every call takes
/// a semaphore permit, so at most `max_concurrent` inference calls run at once
/// no matter how many queries or ingest tasks are in flight.
pub struct EmbedderPool {
    embedder: Arc<dyn Embedder>,
    config: EmbeddingConfig,
    semaphore: Semaphore,
    max_concurrent: usize,
}

impl EmbedderPool {
    /// Wrap `embedder` with the default [`EmbeddingConfig`].
    pub fn new(embedder: Arc<dyn Embedder>, max_concurrent: usize) -> Self {
        Self::with_config(embedder, max_concurrent, EmbeddingConfig::default())
    }

    pub fn with_config(
        embedder: Arc<dyn Embedder>,
        max_concurrent: usize,
        config: EmbeddingConfig,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            embedder,
            config,
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
        }
    }

    /// Embedding dimension of the wrapped model.
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    /// Embed texts, one permit per `batch_size` slice.
    ///
    /// Output order matches input order.
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.config.batch_size.max(1);
        let mut outputs = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            let _permit = self
                .semaphore
                .acquire()
                .await
                .map_err(|e| EmbedError::Inference(format!("semaphore error: {e}")))?;

            let embedded = self.embedder.embed_text(batch, &self.config).await?;
            if embedded.len() != batch.len() {
                return Err(EmbedError::Inference(format!(
                    "embedder returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                )));
            }
            outputs.extend(embedded);
        }

        debug!("Embedded {} texts with {}", texts.len(), self.model_name());
        Ok(outputs)
    }

    /// Embed a single query.
    pub async fn embed_query(&self, query: &str) -> Result<EmbeddingOutput, EmbedError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| EmbedError::Inference(format!("semaphore error: {e}")))?;

        self.embedder.embed_query(query, &self.config).await
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records the largest batch and the peak number of concurrent calls.
    struct CountingEmbedder {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        largest_batch: AtomicUsize,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                largest_batch: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }

        fn dimension(&self) -> usize {
            2
        }

        async fn embed_text(
            &self,
            texts: &[&str],
            _config: &EmbeddingConfig,
        ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.largest_batch.fetch_max(texts.len(), Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            Ok(texts
                .iter()
                .map(|t| EmbeddingOutput {
                    embedding: vec![t.len() as f32, 1.0],
                    token_count: 1,
                })
                .collect())
        }
    }

    /// Returns one vector no matter how many texts it gets.
    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn model_name(&self) -> &str {
            "short"
        }

        fn dimension(&self) -> usize {
            1
        }

        async fn embed_text(
            &self,
            _texts: &[&str],
            _config: &EmbeddingConfig,
        ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
            Ok(vec![EmbeddingOutput {
                embedding: vec![1.0],
                token_count: 1,
            }])
        }
    }

    #[tokio::test]
    async fn test_pool_accessors() {
        let pool = EmbedderPool::new(Arc::new(CountingEmbedder::new()), 3);
        assert_eq!(pool.dimension(), 2);
        assert_eq!(pool.model_name(), "counting");
        assert_eq!(pool.max_concurrent(), 3);
        assert_eq!(pool.available_permits(), 3);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped() {
        let pool = EmbedderPool::new(Arc::new(CountingEmbedder::new()), 0);
        assert_eq!(pool.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_embed_batch_splits_and_keeps_order() {
        let embedder = Arc::new(CountingEmbedder::new());
        let config = EmbeddingConfig {
            batch_size: 2,
            ..EmbeddingConfig::default()
        };
        let pool = EmbedderPool::with_config(embedder.clone(), 2, config);

        let outputs = pool.embed_batch(&["a", "bb", "ccc", "dddd", "eeeee"]).await.unwrap();
        let lengths: Vec<f32> = outputs.iter().map(|o| o.embedding[0]).collect();
        assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(embedder.largest_batch.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_embed_batch_empty() {
        let pool = EmbedderPool::new(Arc::new(CountingEmbedder::new()), 1);
        assert!(pool.embed_batch(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embed_batch_rejects_short_output() {
        let pool = EmbedderPool::new(Arc::new(ShortEmbedder), 1);
        assert!(matches!(
            pool.embed_batch(&["a", "b"]).await,
            Err(EmbedError::Inference(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_semaphore_bounds_concurrency() {
        let embedder = Arc::new(CountingEmbedder::new());
        let pool = Arc::new(EmbedderPool::new(embedder.clone(), 2));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move { pool.embed_query(&format!("q{i}")).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(embedder.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available_permits(), 2);
    }
}
