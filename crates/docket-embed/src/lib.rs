//! # docket-embed
//!
//! Embedding generation for docket.
//!
//! The store and the search engine only see `Vec<f32>`; this crate decides
//! where those vectors come from. The embedder is built once at start-up,
//! wrapped in an [`EmbedderPool`], and handed to ingestion, retrieval and the
//! answer service.
//!
//! ## Cargo Features
//!
//! - `candle`: local `sentence-transformers/all-MiniLM-L6-v2` inference via Candle
//! - Without `candle`: [`OpenAiEmbedder`] and [`NoopEmbedder`] only
//!
//! ## Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`EmbedderPool`] | Semaphore-limited front for any [`Embedder`](docket_core::Embedder) |
//! | [`OpenAiEmbedder`] | `POST {base_url}/embeddings` on an OpenAI-compatible API |
//! | [`CandleEmbedder`] | Local BERT-family model (requires `candle` feature) |
//! | [`NoopEmbedder`] | Zero vectors, for wiring tests |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docket_embed::{EmbedderPool, OpenAiEmbedder};
//! use std::sync::Arc;
//!
//! let embedder = OpenAiEmbedder::new(base_url, api_key, "text-embedding-3-small", 1536)?;
//! let pool = EmbedderPool::new(Arc::new(embedder), 4);
//!
//! let query = pool.embed_query("motion to dismiss").await?;
//! ```

#[cfg(feature = "candle")]
pub mod candle;
#[cfg(feature = "candle")]
pub use candle::CandleEmbedder;

pub mod noop;
pub mod openai;
pub mod pool;

pub use noop::NoopEmbedder;
pub use openai::OpenAiEmbedder;
pub use pool::EmbedderPool;

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x = (f64::from(*x) / norm) as f32;
        }
    }
}
