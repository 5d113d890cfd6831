//! Retrieval for docket.
//!
//! - [`similarity`]: exact cosine top-K over a [`CollectionSnapshot`](docket_core::CollectionSnapshot)
//! - [`filter`]: post-ranking metadata filter and modification-time resolution
//! - [`parser`]: `path:` / `ext:` / `from:` / `to:` / `limit:` query tokens
//! - [`executor`]: [`Retriever`] wiring store, search and filter together

pub mod executor;
pub mod filter;
pub mod parser;
pub mod similarity;

pub use executor::{Retrieval, Retriever};
pub use filter::{FilterExt, MtimeResolver};
pub use parser::{ParsedQuery, QueryParser};
pub use similarity::{cosine_similarity, search, ScoredCandidate};
