//! Document sources.
//!
//! [`RawDocDir`] reads the JSON side files of a `raw_docs` directory, one
//! [`RawDocument`] per file. [`TextFileSource`] walks a directory tree for
//! text, Markdown and PDF files, extracts their text and derives a stable
//! document id from path and mtime.

use async_trait::async_trait;
use docket_core::{DocumentSource, Error, RawDocument};
use docket_store::atomic::atomic_write;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

use crate::error::IngestError;
use crate::extract::extract_text;

/// Stable document id for a file: blake3 of `path|mtime`.
#[must_use]
pub fn doc_id_for(path: &Path, modified_time: Option<f64>) -> String {
    let mtime = modified_time.map_or_else(String::new, |t| format!("{t:.6}"));
    let key = format!("{}|{}", path.display(), mtime);
    blake3::hash(key.as_bytes()).to_hex().to_string()
}

/// Write `doc` as `<dir>/<doc_id>.json`, replacing any previous copy.
pub fn save_raw_doc(dir: &Path, doc: &RawDocument) -> Result<PathBuf, IngestError> {
    if doc.doc_id.is_empty() || doc.doc_id.contains(['/', '\\']) || doc.doc_id.starts_with('.') {
        return Err(IngestError::Source(format!(
            "unusable document id: {:?}",
            doc.doc_id
        )));
    }
    let path = dir.join(format!("{}.json", doc.doc_id));
    let bytes = serde_json::to_vec_pretty(doc)?;
    atomic_write(&path, &bytes)?;
    Ok(path)
}

fn modified_secs(metadata: &fs::Metadata) -> Option<f64> {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
}

// ============================================================================
// Raw document directory
// ============================================================================

/// A directory of `*.json` raw documents.
#[derive(Debug, Clone)]
pub struct RawDocDir {
    dir: PathBuf,
}

impl RawDocDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_all(dir: &Path) -> Result<Vec<RawDocument>, IngestError> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "json"))
            .collect();
        paths.sort();

        let mut docs = Vec::with_capacity(paths.len());
        for path in paths {
            let parsed = fs::read(&path)
                .map_err(IngestError::from)
                .and_then(|bytes| Ok(serde_json::from_slice::<RawDocument>(&bytes)?));
            match parsed {
                Ok(mut doc) => {
                    if doc.doc_id.is_empty() {
                        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                            doc.doc_id = stem.to_string();
                        }
                    }
                    docs.push(doc);
                }
                Err(e) => warn!("Skipping raw document {}: {}", path.display(), e),
            }
        }
        Ok(docs)
    }
}

#[async_trait]
impl DocumentSource for RawDocDir {
    fn describe(&self) -> String {
        format!("raw docs in {}", self.dir.display())
    }

    async fn documents(&self) -> Result<Vec<RawDocument>, Error> {
        let dir = self.dir.clone();
        let docs = tokio::task::spawn_blocking(move || Self::read_all(&dir))
            .await
            .map_err(|e| Error::Other(format!("raw doc scan failed: {e}")))??;
        debug!("Read {} raw documents from {}", docs.len(), self.dir.display());
        Ok(docs)
    }
}

// ============================================================================
// Text files
// ============================================================================

/// Files with extractable text under a root directory.
#[derive(Debug, Clone)]
pub struct TextFileSource {
    root: PathBuf,
    extensions: Vec<String>,
}

impl TextFileSource {
    /// Reads `.txt`, `.md` and `.pdf` files by default.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: vec!["txt".to_string(), "md".to_string(), "pdf".to_string()],
        }
    }

    /// Replace the accepted extensions (without the leading dot).
    #[must_use]
    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
    }

    fn scan(&self) -> Result<Vec<RawDocument>, IngestError> {
        fn visit_dir(source: &TextFileSource, dir: &Path, out: &mut Vec<PathBuf>) {
            let entries = match fs::read_dir(dir) {
                Ok(e) => e,
                Err(e) => {
                    warn!("Cannot read directory {:?}: {}", dir, e);
                    return;
                }
            };

            for entry in entries.flatten() {
                let path = entry.path();
                let hidden = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'));
                if hidden {
                    continue;
                }

                if path.is_dir() {
                    visit_dir(source, &path, out);
                } else if path.is_file() && source.accepts(&path) {
                    out.push(path);
                }
            }
        }

        if !self.root.is_dir() {
            return Err(IngestError::Source(format!(
                "not a directory: {}",
                self.root.display()
            )));
        }

        let mut paths = Vec::new();
        visit_dir(self, &self.root, &mut paths);
        paths.sort();

        let mut docs = Vec::with_capacity(paths.len());
        for path in paths {
            let text = match extract_text(&path) {
                Ok(t) => t,
                Err(e) => {
                    warn!("Skipping {:?}: {}", path, e);
                    continue;
                }
            };
            let modified_time = fs::metadata(&path).ok().as_ref().and_then(modified_secs);
            let file_path = fs::canonicalize(&path).unwrap_or(path);
            docs.push(RawDocument {
                doc_id: doc_id_for(&file_path, modified_time),
                file_path: file_path.to_string_lossy().into_owned(),
                raw_text: text,
                modified_time,
            });
        }
        Ok(docs)
    }
}

#[async_trait]
impl DocumentSource for TextFileSource {
    fn describe(&self) -> String {
        format!("documents under {}", self.root.display())
    }

    async fn documents(&self) -> Result<Vec<RawDocument>, Error> {
        let source = self.clone();
        let docs = tokio::task::spawn_blocking(move || source.scan())
            .await
            .map_err(|e| Error::Other(format!("text scan failed: {e}")))??;
        debug!("Found {} documents under {}", docs.len(), self.root.display());
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_doc_id_is_stable_and_mtime_sensitive() {
        let path = Path::new("/cases/letter.txt");
        let a = doc_id_for(path, Some(100.0));
        assert_eq!(a, doc_id_for(path, Some(100.0)));
        assert_ne!(a, doc_id_for(path, Some(101.0)));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_save_raw_doc_round_trips_through_dir() {
        let temp_dir = tempdir().unwrap();
        let doc = RawDocument {
            doc_id: "doc-1".into(),
            file_path: "/x/letter.txt".into(),
            raw_text: "Dear Sir".into(),
            modified_time: Some(1_736_553_600.0),
        };
        let path = save_raw_doc(temp_dir.path(), &doc).unwrap();
        assert_eq!(path, temp_dir.path().join("doc-1.json"));

        let docs = RawDocDir::read_all(temp_dir.path()).unwrap();
        assert_eq!(docs, vec![doc]);
    }

    #[test]
    fn test_save_raw_doc_rejects_path_ids() {
        let temp_dir = tempdir().unwrap();
        let doc = RawDocument {
            doc_id: "../escape".into(),
            file_path: String::new(),
            raw_text: String::new(),
            modified_time: None,
        };
        assert!(matches!(
            save_raw_doc(temp_dir.path(), &doc),
            Err(IngestError::Source(_))
        ));
    }

    #[tokio::test]
    async fn test_raw_doc_dir_skips_bad_files() {
        let temp_dir = tempdir().unwrap();
        fs::write(
            temp_dir.path().join("b.json"),
            r#"{"doc_id": "b", "file_path": "/b.txt", "raw_text": "beta"}"#,
        )
        .unwrap();
        fs::write(
            temp_dir.path().join("a.json"),
            r#"{"doc_id": "", "file_path": "/a.txt", "raw_text": "alpha", "mtime": 5}"#,
        )
        .unwrap();
        fs::write(temp_dir.path().join("broken.json"), "{not json").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let docs = RawDocDir::new(temp_dir.path()).documents().await.unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(docs[0].modified_time, Some(5.0));
    }

    #[tokio::test]
    async fn test_raw_doc_dir_missing_is_error() {
        let temp_dir = tempdir().unwrap();
        let source = RawDocDir::new(temp_dir.path().join("nope"));
        assert!(source.documents().await.is_err());
    }

    #[tokio::test]
    async fn test_text_file_source_walks_tree() {
        let temp_dir = tempdir().unwrap();
        let nested = temp_dir.path().join("15_Letters_and_Emails");
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir_all(temp_dir.path().join(".git")).unwrap();
        fs::write(nested.join("letter.txt"), "Dear Sir").unwrap();
        fs::write(temp_dir.path().join("notes.md"), "# Notes").unwrap();
        // Unreadable PDFs are skipped, not fatal.
        fs::write(temp_dir.path().join("scan.pdf"), "%PDF").unwrap();
        fs::write(temp_dir.path().join(".git").join("HEAD.txt"), "ref").unwrap();

        let docs = TextFileSource::new(temp_dir.path()).documents().await.unwrap();

        assert_eq!(docs.len(), 2);
        assert!(docs.iter().any(|d| d.file_path.ends_with("letter.txt")));
        assert!(docs.iter().all(|d| d.modified_time.is_some()));
        let letter = docs.iter().find(|d| d.raw_text == "Dear Sir").unwrap();
        assert_eq!(
            letter.doc_id,
            doc_id_for(Path::new(&letter.file_path), letter.modified_time)
        );
    }

    #[tokio::test]
    async fn test_text_file_source_extracts_pdfs() {
        let temp_dir = tempdir().unwrap();
        let letters = temp_dir.path().join("15_Letters_and_Emails");
        fs::create_dir_all(&letters).unwrap();
        fs::write(
            letters.join("fileA.PDF"),
            crate::extract::tests::tiny_pdf(&["Letter confirming the settlement"]),
        )
        .unwrap();
        fs::write(letters.join("note.txt"), "Call the court").unwrap();

        let docs = TextFileSource::new(temp_dir.path()).documents().await.unwrap();

        assert_eq!(docs.len(), 2);
        let pdf = docs.iter().find(|d| d.file_path.ends_with("fileA.PDF")).unwrap();
        assert!(pdf.raw_text.contains("Letter confirming the settlement"));
        assert!(pdf.modified_time.is_some());
        assert_eq!(pdf.doc_id, doc_id_for(Path::new(&pdf.file_path), pdf.modified_time));

        let text_only = TextFileSource::new(temp_dir.path())
            .with_extensions(&["txt"])
            .documents()
            .await
            .unwrap();
        assert_eq!(text_only.len(), 1);
    }

    #[tokio::test]
    async fn test_text_file_source_custom_extensions() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("a.txt"), "a").unwrap();
        fs::write(temp_dir.path().join("b.rst"), "b").unwrap();

        let docs = TextFileSource::new(temp_dir.path())
            .with_extensions(&[".RST"])
            .documents()
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].raw_text, "b");
    }
}
