//! Core types for docket.
//!
//! ## Storage
//! - [`Record`]: one embedded chunk with its metadata and text
//! - [`MetadataValue`]: scalar metadata value
//! - [`CollectionSnapshot`]: immutable view of a collection
//! - [`CollectionInfo`], [`UpsertStats`]: bookkeeping returned by stores
//!
//! ## Retrieval
//! - [`Filter`]: post-retrieval constraints
//! - [`ResolvedContext`]: a ranked record that survived filtering
//!
//! ## Answers
//! - [`AnswerMode`], [`AnswerSource`], [`Answer`]
//!
//! ## Embedding and ingestion
//! - [`EmbeddingConfig`], [`EmbeddingOutput`], [`RawDocument`]

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Metadata key holding the source file path.
pub const META_FILE_PATH: &str = "file_path";
/// Metadata key holding the source document id.
pub const META_DOC_ID: &str = "doc_id";
/// Metadata key holding the chunk position inside its document.
pub const META_CHUNK_INDEX: &str = "chunk_index";
/// Metadata key holding the source modification time (epoch seconds).
pub const META_MODIFIED_TIME: &str = "modified_time";
/// Metadata key holding a short preview of the chunk text.
pub const META_TEXT_PREVIEW: &str = "text_preview";

// ============================================================================
// Records
// ============================================================================

/// A scalar metadata value attached to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl MetadataValue {
    /// Borrow the value as a string slice, if it is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as a number. Numeric strings are parsed.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::String(s) => s.trim().parse().ok(),
            Self::Boolean(_) => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

/// Record metadata.
pub type Metadata = HashMap<String, MetadataValue>;

/// One embedded unit of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier within the collection
    pub id: String,
    /// Embedding vector
    pub embedding: Vec<f32>,
    /// Scalar metadata
    #[serde(default)]
    pub metadata: Metadata,
    /// Source text of the chunk
    #[serde(default)]
    pub document: String,
}

impl Record {
    /// Create a record without metadata.
    pub fn new(id: impl Into<String>, embedding: Vec<f32>, document: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            embedding,
            metadata: Metadata::new(),
            document: document.into(),
        }
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

// ============================================================================
// Collections
// ============================================================================

/// Immutable in-memory view of a collection.
///
/// `ids`, `metadatas` and `documents` are parallel; `embeddings` is a
/// row-major matrix of `ids.len() * dimension` values in the same row order.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSnapshot {
    pub name: String,
    pub dimension: usize,
    pub generation: u64,
    pub ids: Vec<String>,
    pub embeddings: Vec<f32>,
    pub metadatas: Vec<Metadata>,
    pub documents: Vec<String>,
}

impl CollectionSnapshot {
    /// Build a snapshot from records, in insertion order.
    ///
    /// Callers are expected to have validated dimensions already.
    #[must_use]
    pub fn from_records(name: &str, dimension: usize, generation: u64, records: &[Record]) -> Self {
        let mut snapshot = Self {
            name: name.to_string(),
            dimension,
            generation,
            ids: Vec::with_capacity(records.len()),
            embeddings: Vec::with_capacity(records.len() * dimension),
            metadatas: Vec::with_capacity(records.len()),
            documents: Vec::with_capacity(records.len()),
        };
        for record in records {
            snapshot.ids.push(record.id.clone());
            snapshot.embeddings.extend_from_slice(&record.embedding);
            snapshot.metadatas.push(record.metadata.clone());
            snapshot.documents.push(record.document.clone());
        }
        snapshot
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the collection holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Embedding of the record at `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row >= self.len()`.
    #[must_use]
    pub fn row(&self, row: usize) -> &[f32] {
        let start = row * self.dimension;
        &self.embeddings[start..start + self.dimension]
    }

    /// Materialize the record at `row` as a ranked context.
    #[must_use]
    pub fn context(&self, row: usize, rank: usize, score: f32) -> ResolvedContext {
        ResolvedContext {
            rank,
            score,
            id: self.ids[row].clone(),
            metadata: self.metadatas[row].clone(),
            document: self.documents[row].clone(),
        }
    }
}

/// Summary of a stored collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub records: usize,
    pub dimension: usize,
    pub generation: u64,
}

/// Outcome of a successful upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertStats {
    /// Records added by this call
    pub inserted: usize,
    /// Records in the collection after the call
    pub total: usize,
    /// Persisted generation after the call
    pub generation: u64,
}

// ============================================================================
// Retrieval
// ============================================================================

/// Post-retrieval constraints. Every set field must pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Case-sensitive substring of the record's path
    pub path_contains: Option<String>,
    /// Case-insensitive suffix of the record's path, e.g. `.pdf`
    pub file_extension: Option<String>,
    /// Records modified strictly before this are excluded
    pub date_from: Option<NaiveDateTime>,
    /// Records modified after this plus one day are excluded
    pub date_to: Option<NaiveDateTime>,
}

impl Filter {
    /// True when no constraint is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.path_contains.is_none()
            && self.file_extension.is_none()
            && self.date_from.is_none()
            && self.date_to.is_none()
    }

    /// True when a date window is set.
    #[must_use]
    pub fn has_date_window(&self) -> bool {
        self.date_from.is_some() || self.date_to.is_some()
    }

    /// Build a filter from optional string inputs, as received from the CLI or HTTP.
    pub fn from_parts(
        path_contains: Option<String>,
        file_extension: Option<String>,
        date_from: Option<&str>,
        date_to: Option<&str>,
    ) -> Result<Self, Error> {
        Ok(Self {
            path_contains: path_contains.filter(|s| !s.is_empty()),
            file_extension: file_extension.filter(|s| !s.is_empty()),
            date_from: date_from.map(parse_date_bound).transpose()?,
            date_to: date_to.map(parse_date_bound).transpose()?,
        })
    }
}

/// Parse a date bound: `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS[.f]` or RFC 3339.
///
/// Date-only values mean midnight. RFC 3339 values are converted to local time.
pub fn parse_date_bound(s: &str) -> Result<NaiveDateTime, Error> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Local).naive_local());
    }
    Err(Error::InvalidFilter(format!("unrecognized date: {s:?}")))
}

/// A record that survived ranking and filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedContext {
    /// 1-based rank in the similarity ordering
    pub rank: usize,
    /// Cosine similarity to the query
    pub score: f32,
    pub id: String,
    pub metadata: Metadata,
    pub document: String,
}

impl ResolvedContext {
    /// Source path, if the record carries one.
    #[must_use]
    pub fn file_path(&self) -> Option<&str> {
        self.metadata.get(META_FILE_PATH).and_then(MetadataValue::as_str)
    }

    /// Human label for citations: path, then document id, then `unknown`.
    #[must_use]
    pub fn source_label(&self) -> String {
        self.metadata
            .get(META_FILE_PATH)
            .or_else(|| self.metadata.get(META_DOC_ID))
            .map_or_else(|| "unknown".to_string(), ToString::to_string)
    }

    /// Chunk index rendered for citations.
    #[must_use]
    pub fn chunk_label(&self) -> String {
        self.metadata
            .get(META_CHUNK_INDEX)
            .map_or_else(|| "?".to_string(), ToString::to_string)
    }
}

// ============================================================================
// Answers
// ============================================================================

/// Answer layout for extractive answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// Summary plus numbered citations
    #[default]
    Compact,
    /// Summary plus labeled snippets
    Detailed,
}

impl FromStr for AnswerMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "detailed" => Ok(Self::Detailed),
            other => Err(Error::Other(format!("unknown answer mode: {other}"))),
        }
    }
}

/// How an answer was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSource {
    /// Returned verbatim by a generator
    Generated,
    /// Built locally from the filtered contexts
    Extractive,
    /// Nothing survived filtering
    Degenerate,
}

/// A formatted answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub mode: AnswerMode,
    pub source: AnswerSource,
    pub contexts: Vec<ResolvedContext>,
}

// ============================================================================
// Embedding
// ============================================================================

/// Configuration for embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Normalize embeddings to unit length
    pub normalize: bool,
    /// Batch size for processing
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            normalize: true,
            batch_size: 32,
        }
    }
}

/// Output from embedding.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    /// The embedding vector
    pub embedding: Vec<f32>,
    /// Number of tokens in input
    pub token_count: usize,
}

// ============================================================================
// Raw documents
// ============================================================================

/// A whole document before chunking.
///
/// Serialized as the JSON side file that ingestion writes to the raw-docs
/// directory and the date resolver reads back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    pub doc_id: String,
    pub file_path: String,
    #[serde(default)]
    pub raw_text: String,
    /// Modification time in epoch seconds
    #[serde(default, alias = "mtime", alias = "file_mtime", alias = "modified")]
    pub modified_time: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== MetadataValue Tests ====================

    #[test]
    fn test_metadata_value_untagged_json() {
        let meta: Metadata = serde_json::from_str(
            r#"{"file_path": "/a/b.pdf", "chunk_index": 2, "modified_time": 1736553600.5, "ocr": false}"#,
        )
        .unwrap();

        assert_eq!(meta["file_path"], MetadataValue::String("/a/b.pdf".into()));
        assert_eq!(meta["chunk_index"], MetadataValue::Integer(2));
        assert_eq!(meta["modified_time"], MetadataValue::Float(1_736_553_600.5));
        assert_eq!(meta["ocr"], MetadataValue::Boolean(false));
    }

    #[test]
    fn test_metadata_value_as_f64() {
        assert_eq!(MetadataValue::Integer(7).as_f64(), Some(7.0));
        assert_eq!(MetadataValue::String(" 12.5 ".into()).as_f64(), Some(12.5));
        assert_eq!(MetadataValue::String("soon".into()).as_f64(), None);
        assert_eq!(MetadataValue::Boolean(true).as_f64(), None);
    }

    #[test]
    fn test_metadata_value_display() {
        assert_eq!(MetadataValue::Integer(3).to_string(), "3");
        assert_eq!(MetadataValue::String("x".into()).to_string(), "x");
    }

    // ==================== Snapshot Tests ====================

    #[test]
    fn test_snapshot_from_records() {
        let records = vec![
            Record::new("a", vec![1.0, 0.0], "alpha").with_meta(META_CHUNK_INDEX, 0_i64),
            Record::new("b", vec![0.0, 1.0], "beta"),
        ];
        let snapshot = CollectionSnapshot::from_records("c", 2, 1, &records);

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.row(1), &[0.0, 1.0]);
        let ctx = snapshot.context(0, 1, 0.5);
        assert_eq!(ctx.id, "a");
        assert_eq!(ctx.document, "alpha");
        assert_eq!(ctx.chunk_label(), "0");
    }

    // ==================== Filter Tests ====================

    #[test]
    fn test_filter_default_is_empty() {
        assert!(Filter::default().is_empty());
        assert!(!Filter::default().has_date_window());
    }

    #[test]
    fn test_filter_from_parts_drops_empty_strings() {
        let filter = Filter::from_parts(Some(String::new()), Some(".pdf".into()), None, None)
            .unwrap();
        assert!(filter.path_contains.is_none());
        assert_eq!(filter.file_extension.as_deref(), Some(".pdf"));
    }

    #[test]
    fn test_parse_date_bound_date_only() {
        let dt = parse_date_bound("2025-01-01").unwrap();
        assert_eq!(dt.to_string(), "2025-01-01 00:00:00");
    }

    #[test]
    fn test_parse_date_bound_datetime() {
        let dt = parse_date_bound("2025-03-04T10:11:12").unwrap();
        assert_eq!(dt.to_string(), "2025-03-04 10:11:12");
    }

    #[test]
    fn test_parse_date_bound_invalid() {
        assert!(matches!(
            parse_date_bound("last tuesday"),
            Err(Error::InvalidFilter(_))
        ));
    }

    // ==================== ResolvedContext Tests ====================

    #[test]
    fn test_source_label_fallbacks() {
        let mut ctx = ResolvedContext {
            rank: 1,
            score: 0.9,
            id: "x".into(),
            metadata: Metadata::new(),
            document: String::new(),
        };
        assert_eq!(ctx.source_label(), "unknown");

        ctx.metadata.insert(META_DOC_ID.into(), "doc-1".into());
        assert_eq!(ctx.source_label(), "doc-1");

        ctx.metadata.insert(META_FILE_PATH.into(), "/cases/a.pdf".into());
        assert_eq!(ctx.source_label(), "/cases/a.pdf");
        assert_eq!(ctx.file_path(), Some("/cases/a.pdf"));
    }

    // ==================== AnswerMode Tests ====================

    #[test]
    fn test_answer_mode_parse() {
        assert_eq!("compact".parse::<AnswerMode>().unwrap(), AnswerMode::Compact);
        assert_eq!("DETAILED".parse::<AnswerMode>().unwrap(), AnswerMode::Detailed);
        assert!("verbose".parse::<AnswerMode>().is_err());
    }

    #[test]
    fn test_answer_source_serialization() {
        assert_eq!(
            serde_json::to_string(&AnswerSource::Extractive).unwrap(),
            "\"extractive\""
        );
    }

    // ==================== RawDocument Tests ====================

    #[test]
    fn test_raw_document_mtime_alias() {
        let doc: RawDocument = serde_json::from_str(
            r#"{"doc_id": "d1", "file_path": "/x.txt", "raw_text": "hi", "mtime": 100.0}"#,
        )
        .unwrap();
        assert_eq!(doc.modified_time, Some(100.0));
    }
}
