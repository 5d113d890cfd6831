//! Ingestion service: source → chunk → embed → upsert.

use docket_core::{
    CollectionSnapshot, DocumentSource, EmbeddingStore, MetadataValue, RawDocument, Record,
    META_CHUNK_INDEX, META_DOC_ID, META_FILE_PATH, META_MODIFIED_TIME, META_TEXT_PREVIEW,
};
use docket_embed::EmbedderPool;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chunker::ParagraphChunker;
use crate::error::IngestError;
use crate::source::save_raw_doc;

const PREVIEW_CHARS: usize = 300;
const DEFAULT_FLUSH_RECORDS: usize = 512;

/// Counts from one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Documents produced by the source
    pub documents_seen: usize,
    /// Documents whose chunks were stored by this run
    pub ingested: usize,
    /// Documents already present in the collection
    pub skipped: usize,
    /// Documents that failed to embed or store
    pub failed: usize,
    /// Documents with no text
    pub empty: usize,
    /// Records stored by this run
    pub chunks: usize,
}

/// A document whose records wait for the next upsert.
struct Pending {
    doc_id: String,
    records: Vec<Record>,
}

/// Main ingestion service.
pub struct IngestService {
    /// Vector store
    store: Arc<dyn EmbeddingStore>,
    /// Embedder pool
    embedder: Arc<EmbedderPool>,
    /// Chunker
    chunker: ParagraphChunker,
    /// Where to mirror ingested documents as JSON side files
    raw_docs_mirror: Option<PathBuf>,
    /// Pending record count that triggers an upsert
    flush_records: usize,
}

impl IngestService {
    pub fn new(
        store: Arc<dyn EmbeddingStore>,
        embedder: Arc<EmbedderPool>,
        chunker: ParagraphChunker,
    ) -> Self {
        Self {
            store,
            embedder,
            chunker,
            raw_docs_mirror: None,
            flush_records: DEFAULT_FLUSH_RECORDS,
        }
    }

    /// Mirror every ingested document into `dir` so the date resolver can
    /// find its modification time later.
    #[must_use]
    pub fn with_raw_docs_mirror(mut self, dir: PathBuf) -> Self {
        self.raw_docs_mirror = Some(dir);
        self
    }

    #[must_use]
    pub fn with_flush_records(mut self, records: usize) -> Self {
        self.flush_records = records.max(1);
        self
    }

    /// Ingest everything `source` yields into `collection`.
    ///
    /// Fails only when the source or the existing collection cannot be read;
    /// per-document failures are logged and counted.
    pub async fn ingest(
        &self,
        collection: &str,
        source: &dyn DocumentSource,
    ) -> Result<IngestReport, IngestError> {
        info!("Ingesting {} into '{}'", source.describe(), collection);
        let docs = source
            .documents()
            .await
            .map_err(|e| IngestError::Source(e.to_string()))?;
        self.ingest_documents(collection, docs).await
    }

    /// Ingest already-loaded documents.
    pub async fn ingest_documents(
        &self,
        collection: &str,
        docs: Vec<RawDocument>,
    ) -> Result<IngestReport, IngestError> {
        let mut seen = match self.store.load(collection).await? {
            Some(snapshot) => stored_doc_ids(&snapshot),
            None => HashSet::new(),
        };

        let mut report = IngestReport {
            documents_seen: docs.len(),
            ..IngestReport::default()
        };
        let mut pending: Vec<Pending> = Vec::new();
        let mut pending_records = 0;

        for doc in docs {
            if doc.doc_id.is_empty() {
                warn!("Skipping document without id: {}", doc.file_path);
                report.failed += 1;
                continue;
            }
            if seen.contains(&doc.doc_id) {
                debug!("Document {} already ingested, skipping", doc.doc_id);
                report.skipped += 1;
                continue;
            }

            let chunks = self.chunker.chunk(&doc.raw_text);
            if chunks.is_empty() {
                debug!("Empty content for {}, skipping", doc.doc_id);
                report.empty += 1;
                continue;
            }

            let texts: Vec<&str> = chunks.iter().map(String::as_str).collect();
            let embeddings = match self.embedder.embed_batch(&texts).await {
                Ok(e) => e,
                Err(e) => {
                    warn!("Failed to embed {}: {}", doc.doc_id, e);
                    report.failed += 1;
                    continue;
                }
            };

            let records: Vec<Record> = chunks
                .into_iter()
                .zip(embeddings)
                .enumerate()
                .map(|(idx, (text, output))| build_record(&doc, idx, text, output.embedding))
                .collect();

            if let Some(dir) = &self.raw_docs_mirror {
                mirror(dir, &doc).await;
            }

            seen.insert(doc.doc_id.clone());
            pending_records += records.len();
            pending.push(Pending {
                doc_id: doc.doc_id,
                records,
            });

            if pending_records >= self.flush_records {
                self.flush(collection, std::mem::take(&mut pending), &mut report)
                    .await;
                pending_records = 0;
            }
        }

        if !pending.is_empty() {
            self.flush(collection, pending, &mut report).await;
        }

        info!(
            "Ingest into '{}' done: {} ingested, {} skipped, {} failed, {} empty, {} chunks",
            collection, report.ingested, report.skipped, report.failed, report.empty, report.chunks
        );
        Ok(report)
    }

    async fn flush(&self, collection: &str, batch: Vec<Pending>, report: &mut IngestReport) {
        let records: Vec<Record> = batch.iter().flat_map(|p| p.records.iter().cloned()).collect();
        match self.store.upsert(collection, &records).await {
            Ok(stats) => {
                debug!(
                    "Stored {} records for {} documents (total {})",
                    stats.inserted,
                    batch.len(),
                    stats.total
                );
                report.ingested += batch.len();
                report.chunks += stats.inserted;
            }
            Err(e) => {
                let ids: Vec<&str> = batch.iter().map(|p| p.doc_id.as_str()).collect();
                warn!("Failed to store documents {:?}: {}", ids, e);
                report.failed += batch.len();
            }
        }
    }
}

async fn mirror(dir: &Path, doc: &RawDocument) {
    let dir = dir.to_path_buf();
    let doc = doc.clone();
    let doc_id = doc.doc_id.clone();
    match tokio::task::spawn_blocking(move || save_raw_doc(&dir, &doc)).await {
        Ok(Ok(path)) => debug!("Mirrored {} to {}", doc_id, path.display()),
        Ok(Err(e)) => warn!("Failed to mirror {}: {}", doc_id, e),
        Err(e) => warn!("Mirror task for {} failed: {}", doc_id, e),
    }
}

/// Document ids already present in a collection.
fn stored_doc_ids(snapshot: &CollectionSnapshot) -> HashSet<String> {
    snapshot
        .ids
        .iter()
        .zip(&snapshot.metadatas)
        .filter_map(|(id, meta)| {
            meta.get(META_DOC_ID)
                .and_then(MetadataValue::as_str)
                .map(str::to_string)
                .or_else(|| id.rsplit_once("--").map(|(doc, _)| doc.to_string()))
        })
        .collect()
}

fn build_record(doc: &RawDocument, idx: usize, text: String, embedding: Vec<f32>) -> Record {
    let preview: String = text.chars().take(PREVIEW_CHARS).collect();
    let mut record = Record::new(format!("{}--{}", doc.doc_id, idx), embedding, text)
        .with_meta(META_DOC_ID, doc.doc_id.as_str())
        .with_meta(META_FILE_PATH, doc.file_path.as_str())
        .with_meta(META_CHUNK_INDEX, idx as i64)
        .with_meta(META_TEXT_PREVIEW, preview);
    if let Some(mtime) = doc.modified_time {
        record = record.with_meta(META_MODIFIED_TIME, mtime);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docket_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};
    use docket_embed::NoopEmbedder;
    use docket_store::MemoryStore;
    use tempfile::tempdir;

    /// Fails on any text containing "poison".
    struct PickyEmbedder;

    #[async_trait]
    impl Embedder for PickyEmbedder {
        fn model_name(&self) -> &str {
            "picky"
        }

        fn dimension(&self) -> usize {
            2
        }

        async fn embed_text(
            &self,
            texts: &[&str],
            _config: &EmbeddingConfig,
        ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
            if texts.iter().any(|t| t.contains("poison")) {
                return Err(EmbedError::Inference("refused".into()));
            }
            Ok(texts
                .iter()
                .map(|t| EmbeddingOutput {
                    embedding: vec![t.len() as f32, 1.0],
                    token_count: 1,
                })
                .collect())
        }
    }

    fn doc(id: &str, text: &str) -> RawDocument {
        RawDocument {
            doc_id: id.into(),
            file_path: format!("/docs/{id}.txt"),
            raw_text: text.into(),
            modified_time: Some(1_736_553_600.0),
        }
    }

    fn service(store: Arc<dyn EmbeddingStore>, embedder: Arc<dyn Embedder>) -> IngestService {
        IngestService::new(
            store,
            Arc::new(EmbedderPool::new(embedder, 2)),
            ParagraphChunker::new(10),
        )
    }

    #[tokio::test]
    async fn test_ingest_builds_records() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone(), Arc::new(PickyEmbedder));
        let text = format!("{}\n\n{}", "a".repeat(40), "b".repeat(40));

        let report = svc.ingest_documents("c", vec![doc("d1", &text)]).await.unwrap();
        assert_eq!(report.ingested, 1);
        assert_eq!(report.chunks, 2);

        let snapshot = store.load("c").await.unwrap().unwrap();
        assert_eq!(snapshot.ids, vec!["d1--0", "d1--1"]);
        let meta = &snapshot.metadatas[1];
        assert_eq!(meta[META_DOC_ID], MetadataValue::from("d1"));
        assert_eq!(meta[META_FILE_PATH], MetadataValue::from("/docs/d1.txt"));
        assert_eq!(meta[META_CHUNK_INDEX], MetadataValue::Integer(1));
        assert_eq!(meta[META_MODIFIED_TIME], MetadataValue::Float(1_736_553_600.0));
        assert_eq!(snapshot.documents[1], "b".repeat(40));
    }

    #[tokio::test]
    async fn test_ingest_is_incremental() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone(), Arc::new(NoopEmbedder::with_dimension(4)));

        let first = svc
            .ingest_documents("c", vec![doc("d1", "one"), doc("d2", "two")])
            .await
            .unwrap();
        assert_eq!(first.ingested, 2);

        let second = svc
            .ingest_documents("c", vec![doc("d1", "one"), doc("d2", "two"), doc("d3", "three")])
            .await
            .unwrap();
        assert_eq!(second.skipped, 2);
        assert_eq!(second.ingested, 1);
        assert_eq!(store.load("c").await.unwrap().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_doc_in_one_run_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone(), Arc::new(NoopEmbedder::with_dimension(4)));

        let report = svc
            .ingest_documents("c", vec![doc("d1", "one"), doc("d1", "one again")])
            .await
            .unwrap();
        assert_eq!(report.ingested, 1);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_embed_failure_is_counted_and_skipped() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone(), Arc::new(PickyEmbedder));

        let report = svc
            .ingest_documents(
                "c",
                vec![doc("ok", "fine text"), doc("bad", "poison"), doc("empty", "  \n\n ")],
            )
            .await
            .unwrap();

        assert_eq!(report.documents_seen, 3);
        assert_eq!(report.ingested, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.empty, 1);
    }

    #[tokio::test]
    async fn test_store_failure_fails_the_batch() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert("c", &[Record::new("seed", vec![1.0, 0.0, 0.0], "seed")])
            .await
            .unwrap();
        // Two-dimensional embeddings cannot join a three-dimensional collection.
        let svc = service(store.clone(), Arc::new(PickyEmbedder)).with_flush_records(1);

        let report = svc
            .ingest_documents("c", vec![doc("d1", "one"), doc("d2", "two")])
            .await
            .unwrap();
        assert_eq!(report.failed, 2);
        assert_eq!(report.ingested, 0);
        assert_eq!(store.load("c").await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mirror_writes_raw_docs() {
        let temp_dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let svc = service(store, Arc::new(NoopEmbedder::with_dimension(4)))
            .with_raw_docs_mirror(temp_dir.path().to_path_buf());

        svc.ingest_documents("c", vec![doc("d1", "hello")]).await.unwrap();

        let written: RawDocument =
            serde_json::from_slice(&std::fs::read(temp_dir.path().join("d1.json")).unwrap())
                .unwrap();
        assert_eq!(written.modified_time, Some(1_736_553_600.0));
    }

    #[test]
    fn test_stored_doc_ids_falls_back_to_id_prefix() {
        let records = vec![
            Record::new("a--0", vec![1.0], "").with_meta(META_DOC_ID, "a"),
            Record::new("b--3", vec![1.0], ""),
            Record::new("loose", vec![1.0], ""),
        ];
        let snapshot = CollectionSnapshot::from_records("c", 1, 1, &records);
        let ids = stored_doc_ids(&snapshot);
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("a") && ids.contains("b"));
    }
}
