//! Ingestion for docket.
//!
//! A [`DocumentSource`](docket_core::DocumentSource) yields whole documents;
//! [`IngestService`] splits them with the [`ParagraphChunker`], embeds the
//! chunks and upserts one record per chunk with ids `{doc_id}--{index}`.
//!
//! Re-running an ingest skips documents whose chunks are already stored.

pub mod chunker;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod source;

pub use chunker::ParagraphChunker;
pub use error::IngestError;
pub use extract::{extract_text, FileKind};
pub use ingest::{IngestReport, IngestService};
pub use source::{doc_id_for, save_raw_doc, RawDocDir, TextFileSource};
