//! Integration tests for the full docket pipeline.
//!
//! Tests the complete flow: source → chunk → embed → store → search → answer.

use async_trait::async_trait;
use docket_answer::{AnswerService, AskRequest, Assembler, GenerationSettings};
use docket_core::{
    AnswerMode, AnswerSource, EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput,
    EmbeddingStore, Filter, GenerateError, Generator, META_FILE_PATH,
};
use docket_embed::EmbedderPool;
use docket_ingest::{IngestService, ParagraphChunker, RawDocDir, TextFileSource};
use docket_query::{MtimeResolver, Retriever};
use docket_store::FlatFileStore;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::tempdir;

const VOCABULARY: [&str; 8] = [
    "settlement",
    "invoice",
    "deadline",
    "letter",
    "court",
    "refund",
    "meeting",
    "contract",
];

/// Mock embedder for testing (avoids network access).
///
/// One axis per vocabulary word plus a constant axis, so every text has a
/// non-zero vector.
struct VocabularyEmbedder;

#[async_trait]
impl Embedder for VocabularyEmbedder {
    fn model_name(&self) -> &str {
        "vocabulary"
    }

    fn dimension(&self) -> usize {
        VOCABULARY.len() + 1
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        _config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                let mut embedding: Vec<f32> = VOCABULARY
                    .iter()
                    .map(|w| lower.matches(w).count() as f32)
                    .collect();
                embedding.push(0.1);
                EmbeddingOutput {
                    embedding,
                    token_count: text.split_whitespace().count(),
                }
            })
            .collect())
    }
}

/// Generator that always reports an exhausted quota.
struct QuotaGenerator;

#[async_trait]
impl Generator for QuotaGenerator {
    fn model_name(&self) -> &str {
        "quota"
    }

    async fn complete(&self, _: &str, _: u32, _: f32) -> Result<String, GenerateError> {
        Err(GenerateError::QuotaExceeded)
    }
}

struct Stack {
    store: Arc<dyn EmbeddingStore>,
    pool: Arc<EmbedderPool>,
}

fn stack(store_root: &Path) -> Stack {
    Stack {
        store: Arc::new(FlatFileStore::new(store_root.to_path_buf())),
        pool: Arc::new(EmbedderPool::new(Arc::new(VocabularyEmbedder), 2)),
    }
}

fn answer_service(stack: &Stack, raw_docs: Option<&Path>) -> AnswerService {
    let retriever = Arc::new(Retriever::new(
        Arc::clone(&stack.store),
        Arc::clone(&stack.pool),
        MtimeResolver::new(raw_docs.map(Path::to_path_buf)),
        3,
    ));
    AnswerService::new(retriever, Assembler::default())
}

fn set_mtime(path: &Path, epoch_secs: u64) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(UNIX_EPOCH + Duration::from_secs(epoch_secs))
        .unwrap();
}

fn request(question: &str, top_k: usize, filter: Filter) -> AskRequest {
    AskRequest {
        question: question.to_string(),
        collection: "cases".to_string(),
        top_k,
        mode: AnswerMode::Compact,
        filter,
    }
}

#[tokio::test]
async fn test_full_pipeline_ingest_search_ask() {
    let source_dir = tempdir().unwrap();
    let store_dir = tempdir().unwrap();

    fs::write(
        source_dir.path().join("settlement.txt"),
        "The settlement offer was rejected by the court. A new settlement meeting is planned.",
    )
    .unwrap();
    fs::write(
        source_dir.path().join("invoice.md"),
        "Invoice 42 is overdue. The refund for invoice 41 was issued.",
    )
    .unwrap();
    fs::write(
        source_dir.path().join("deadline.txt"),
        "The filing deadline is Friday.\n\nThe contract deadline moved to March.",
    )
    .unwrap();

    let stack = stack(store_dir.path());
    let ingest = IngestService::new(
        Arc::clone(&stack.store),
        Arc::clone(&stack.pool),
        ParagraphChunker::default(),
    );
    let source = TextFileSource::new(source_dir.path());

    let report = ingest.ingest("cases", &source).await.unwrap();
    assert_eq!(report.documents_seen, 3);
    assert_eq!(report.ingested, 3);
    assert_eq!(report.chunks, 3);

    // Re-running skips everything already stored.
    let again = ingest.ingest("cases", &source).await.unwrap();
    assert_eq!(again.skipped, 3);
    assert_eq!(again.ingested, 0);

    let service = answer_service(&stack, None);
    let retrieval = service
        .retriever()
        .retrieve("cases", "settlement talks", 1, &Filter::default())
        .await
        .unwrap();
    assert_eq!(retrieval.contexts.len(), 1);
    assert!(retrieval.contexts[0]
        .file_path()
        .unwrap()
        .ends_with("settlement.txt"));

    let answer = service
        .ask(&request("which invoice needs a refund", 2, Filter::default()))
        .await
        .unwrap();
    assert_eq!(answer.source, AnswerSource::Extractive);
    assert!(answer.text.starts_with("Invoice 42 is overdue."));
    assert!(answer.text.contains("Sources:\n[1] "));
    assert!(answer.text.contains("invoice.md (chunk 0)"));
}

#[tokio::test]
async fn test_empty_collection_gives_degenerate_answer() {
    let store_dir = tempdir().unwrap();
    let stack = stack(store_dir.path());
    let service = answer_service(&stack, None);

    let answer = service
        .ask(&request("anything at all", 5, Filter::default()))
        .await
        .unwrap();

    assert!(answer.contexts.is_empty());
    assert_eq!(answer.source, AnswerSource::Degenerate);
    assert_eq!(answer.text, "No relevant documents found.");
    assert!(!answer.text.contains("Sources:"));
}

#[tokio::test]
async fn test_top_k_larger_than_collection_returns_everything_sorted() {
    let source_dir = tempdir().unwrap();
    let store_dir = tempdir().unwrap();
    for (name, text) in [
        ("a.txt", "court court letter"),
        ("b.txt", "court"),
        ("c.txt", "meeting notes"),
    ] {
        fs::write(source_dir.path().join(name), text).unwrap();
    }

    let stack = stack(store_dir.path());
    IngestService::new(
        Arc::clone(&stack.store),
        Arc::clone(&stack.pool),
        ParagraphChunker::default(),
    )
    .ingest("cases", &TextFileSource::new(source_dir.path()))
    .await
    .unwrap();

    let retrieval = answer_service(&stack, None)
        .retriever()
        .retrieve("cases", "court", 50, &Filter::default())
        .await
        .unwrap();

    assert_eq!(retrieval.contexts.len(), 3);
    assert!(retrieval
        .contexts
        .windows(2)
        .all(|w| w[0].score >= w[1].score));
    let ranks: Vec<usize> = retrieval.contexts.iter().map(|c| c.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_letters_folder_date_window() {
    let source_dir = tempdir().unwrap();
    let store_dir = tempdir().unwrap();
    let letters = source_dir.path().join("15_Letters_and_Emails");
    let other = source_dir.path().join("20_Pleadings");
    fs::create_dir_all(&letters).unwrap();
    fs::create_dir_all(&other).unwrap();

    let a = letters.join("a_letter.txt");
    let b = letters.join("b_letter.txt");
    let c = other.join("c_letter.txt");
    fs::write(&a, "Letter proposing a settlement.").unwrap();
    fs::write(&b, "Letter about the settlement deadline.").unwrap();
    fs::write(&c, "Letter to the court.").unwrap();
    // 2025-01-15 and 2024-12-01, both noon UTC
    set_mtime(&a, 1_736_942_400);
    set_mtime(&b, 1_733_054_400);
    set_mtime(&c, 1_736_942_400);

    let stack = stack(store_dir.path());
    IngestService::new(
        Arc::clone(&stack.store),
        Arc::clone(&stack.pool),
        ParagraphChunker::default(),
    )
    .ingest("cases", &TextFileSource::new(source_dir.path()))
    .await
    .unwrap();

    let filter = Filter::from_parts(
        Some("15_Letters_and_Emails".into()),
        Some(".TXT".into()),
        Some("2025-01-01"),
        None,
    )
    .unwrap();
    let answer = answer_service(&stack, None)
        .ask(&request("settlement letter", 5, filter))
        .await
        .unwrap();

    let paths: Vec<&str> = answer
        .contexts
        .iter()
        .filter_map(|c| c.file_path())
        .collect();
    assert_eq!(paths.len(), 1);
    assert!(paths[0].ends_with("a_letter.txt"));
    assert_eq!(answer.source, AnswerSource::Extractive);
}

#[tokio::test]
async fn test_stored_dates_resolve_after_source_is_gone() {
    let raw_dir = tempdir().unwrap();
    let store_dir = tempdir().unwrap();

    // The referenced files do not exist, so the date comes from the stored
    // metadata. The undated document has no time anywhere and always passes.
    fs::write(
        raw_dir.path().join("old.json"),
        r#"{"doc_id": "old", "file_path": "/gone/old.txt", "raw_text": "Old court letter.", "mtime": 1600000000}"#,
    )
    .unwrap();
    fs::write(
        raw_dir.path().join("undated.json"),
        r#"{"doc_id": "undated", "file_path": "/gone/undated.txt", "raw_text": "Undated court letter."}"#,
    )
    .unwrap();
    let recent = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    fs::write(
        raw_dir.path().join("new.json"),
        format!(
            r#"{{"doc_id": "new", "file_path": "/gone/new.txt", "raw_text": "New court letter.", "modified_time": {recent}}}"#
        ),
    )
    .unwrap();

    let stack = stack(store_dir.path());
    let report = IngestService::new(
        Arc::clone(&stack.store),
        Arc::clone(&stack.pool),
        ParagraphChunker::default(),
    )
    .ingest("cases", &RawDocDir::new(raw_dir.path()))
    .await
    .unwrap();
    assert_eq!(report.ingested, 3);

    let filter = Filter::from_parts(None, None, Some("2021-01-01"), None).unwrap();
    let answer = answer_service(&stack, Some(raw_dir.path()))
        .ask(&request("court letter", 5, filter))
        .await
        .unwrap();

    let mut ids: Vec<&str> = answer.contexts.iter().map(|c| c.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["new--0", "undated--0"]);
}

#[tokio::test]
async fn test_generator_failure_falls_back_to_extractive() {
    let store_dir = tempdir().unwrap();
    let stack = stack(store_dir.path());
    stack
        .store
        .upsert(
            "cases",
            &[docket_core::Record::new(
                "r1",
                vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.1],
                "The court granted the motion. Costs were awarded.",
            )
            .with_meta(META_FILE_PATH, "/cases/order.txt")],
        )
        .await
        .unwrap();

    let service = answer_service(&stack, None)
        .with_generator(Arc::new(QuotaGenerator), GenerationSettings::default());
    let answer = service
        .ask(&request("what did the court decide", 3, Filter::default()))
        .await
        .unwrap();

    assert_eq!(answer.source, AnswerSource::Extractive);
    assert!(answer.text.starts_with("The court granted the motion."));
    assert!(answer.text.contains("[1] /cases/order.txt (chunk ?)"));
}
