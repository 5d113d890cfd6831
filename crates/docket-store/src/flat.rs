//! Flat-file embedding store.
//!
//! Each collection lives in its own directory under the store root:
//!
//! ```text
//! <root>/<collection>/meta.json          ids, metadata, documents, generation
//! <root>/<collection>/embeddings-G.bin   row-major f32 matrix (see [`crate::matrix`])
//! ```
//!
//! An upsert writes `embeddings-{G+1}.bin` first and then replaces `meta.json`
//! atomically. Replacing `meta.json` is the commit point: readers open
//! `meta.json` first and then the embeddings file it names, so they see either
//! the old or the new generation, never a mix.

use async_trait::async_trait;
use docket_core::{
    CollectionInfo, CollectionSnapshot, EmbeddingStore, Metadata, Record, StoreError, UpsertStats,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::atomic::{atomic_write, remove_stale_temps};
use crate::matrix;
use crate::validate::{validate_batch, validate_collection_name};

const META_FILE: &str = "meta.json";
const FORMAT_VERSION: u32 = 1;

/// On-disk description of one committed generation.
#[derive(Debug, Serialize, Deserialize)]
struct MetaFile {
    version: u32,
    dimension: usize,
    generation: u64,
    embeddings_file: String,
    ids: Vec<String>,
    #[serde(default)]
    metadatas: HashMap<String, Metadata>,
    #[serde(default)]
    documents: HashMap<String, String>,
}

fn embeddings_file_name(generation: u64) -> String {
    format!("embeddings-{generation}.bin")
}

fn parse_generation(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix("embeddings-")?
        .strip_suffix(".bin")?
        .parse()
        .ok()
}

fn corrupt(collection: &str, reason: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        collection: collection.to_string(),
        reason: reason.into(),
    }
}

/// Persistent store keeping one directory per collection.
pub struct FlatFileStore {
    root: PathBuf,
    /// Per-collection writer locks
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FlatFileStore {
    /// Create a store rooted at `root`. Nothing is touched until the first write.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Store root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.root.join(collection)
    }

    fn writer_lock(&self, collection: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(collection.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl EmbeddingStore for FlatFileStore {
    fn backend(&self) -> &str {
        "flat"
    }

    async fn upsert(&self, collection: &str, records: &[Record]) -> Result<UpsertStats, StoreError> {
        validate_collection_name(collection)?;

        let lock = self.writer_lock(collection);
        let _guard = lock.lock().await;

        let dir = self.collection_dir(collection);
        let name = collection.to_string();
        let records = records.to_vec();
        let stats = tokio::task::spawn_blocking(move || commit_blocking(&dir, &name, records))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;

        if stats.inserted > 0 {
            debug!(
                "Committed {} records to '{}' (generation {}, total {})",
                stats.inserted, collection, stats.generation, stats.total
            );
        }
        Ok(stats)
    }

    async fn load(&self, collection: &str) -> Result<Option<Arc<CollectionSnapshot>>, StoreError> {
        validate_collection_name(collection)?;

        let dir = self.collection_dir(collection);
        let name = collection.to_string();
        let snapshot = tokio::task::spawn_blocking(move || load_blocking(&dir, &name))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;

        Ok(snapshot.map(Arc::new))
    }

    async fn collections(&self) -> Result<Vec<CollectionInfo>, StoreError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || list_blocking(&root))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

// ============================================================================
// Blocking file I/O
// ============================================================================

fn read_meta(dir: &Path, collection: &str) -> Result<Option<MetaFile>, StoreError> {
    let bytes = match fs::read(dir.join(META_FILE)) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let meta: MetaFile = serde_json::from_slice(&bytes)
        .map_err(|e| corrupt(collection, format!("unreadable {META_FILE}: {e}")))?;
    if meta.version != FORMAT_VERSION {
        return Err(corrupt(
            collection,
            format!("unsupported format version {}", meta.version),
        ));
    }
    Ok(Some(meta))
}

/// Read the committed generation: `meta.json` and the matrix it names.
///
/// A writer may prune the named embeddings file between the two reads; in
/// that case `meta.json` has moved on and is read again.
fn read_committed(
    dir: &Path,
    collection: &str,
) -> Result<Option<(MetaFile, Vec<f32>)>, StoreError> {
    let mut retried = false;
    loop {
        let Some(meta) = read_meta(dir, collection)? else {
            return Ok(None);
        };

        let bytes = match fs::read(dir.join(&meta.embeddings_file)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !retried => {
                debug!(
                    "'{}' vanished while loading '{}', re-reading {}",
                    meta.embeddings_file, collection, META_FILE
                );
                retried = true;
                continue;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(corrupt(
                    collection,
                    format!("missing {}", meta.embeddings_file),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let decoded = matrix::decode(&bytes).map_err(|e| corrupt(collection, e.to_string()))?;
        if decoded.rows != meta.ids.len() {
            return Err(corrupt(
                collection,
                format!(
                    "{} has {} rows but {META_FILE} lists {} ids",
                    meta.embeddings_file,
                    decoded.rows,
                    meta.ids.len()
                ),
            ));
        }
        if decoded.rows > 0 && decoded.dimension != meta.dimension {
            return Err(corrupt(
                collection,
                format!(
                    "{} has dimension {} but {META_FILE} declares {}",
                    meta.embeddings_file, decoded.dimension, meta.dimension
                ),
            ));
        }
        return Ok(Some((meta, decoded.values)));
    }
}

fn load_blocking(dir: &Path, collection: &str) -> Result<Option<CollectionSnapshot>, StoreError> {
    let Some((mut meta, embeddings)) = read_committed(dir, collection)? else {
        return Ok(None);
    };

    let metadatas = meta
        .ids
        .iter()
        .map(|id| meta.metadatas.remove(id).unwrap_or_default())
        .collect();
    let documents = meta
        .ids
        .iter()
        .map(|id| meta.documents.remove(id).unwrap_or_default())
        .collect();

    Ok(Some(CollectionSnapshot {
        name: collection.to_string(),
        dimension: meta.dimension,
        generation: meta.generation,
        ids: meta.ids,
        embeddings,
        metadatas,
        documents,
    }))
}

fn commit_blocking(
    dir: &Path,
    collection: &str,
    records: Vec<Record>,
) -> Result<UpsertStats, StoreError> {
    let current = read_committed(dir, collection)?;

    let (dimension, existing_ids) = match &current {
        Some((meta, _)) => (
            Some(meta.dimension),
            meta.ids.iter().map(String::as_str).collect::<HashSet<_>>(),
        ),
        None => (None, HashSet::new()),
    };
    let dimension = validate_batch(dimension, |id| existing_ids.contains(id), &records)?;
    drop(existing_ids);

    if records.is_empty() {
        return Ok(current.map_or(
            UpsertStats {
                inserted: 0,
                total: 0,
                generation: 0,
            },
            |(meta, _)| UpsertStats {
                inserted: 0,
                total: meta.ids.len(),
                generation: meta.generation,
            },
        ));
    }

    let (mut meta, mut embeddings) = current.unwrap_or_else(|| {
        (
            MetaFile {
                version: FORMAT_VERSION,
                dimension,
                generation: 0,
                embeddings_file: String::new(),
                ids: Vec::new(),
                metadatas: HashMap::new(),
                documents: HashMap::new(),
            },
            Vec::new(),
        )
    });

    let inserted = records.len();
    embeddings.reserve(inserted * dimension);
    for record in records {
        embeddings.extend_from_slice(&record.embedding);
        meta.metadatas.insert(record.id.clone(), record.metadata);
        meta.documents.insert(record.id.clone(), record.document);
        meta.ids.push(record.id);
    }

    let generation = meta.generation + 1;
    meta.generation = generation;
    meta.dimension = dimension;
    meta.embeddings_file = embeddings_file_name(generation);

    fs::create_dir_all(dir)?;
    atomic_write(
        &dir.join(&meta.embeddings_file),
        &matrix::encode(meta.ids.len(), dimension, &embeddings),
    )?;
    atomic_write(&dir.join(META_FILE), &serde_json::to_vec(&meta)?)?;

    prune(dir, generation);

    Ok(UpsertStats {
        inserted,
        total: meta.ids.len(),
        generation,
    })
}

/// Remove embeddings files older than the previous generation.
fn prune(dir: &Path, committed: u64) {
    let keep_from = committed.saturating_sub(1);
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot list {} for pruning: {}", dir.display(), e);
            return;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(generation) = parse_generation(&name.to_string_lossy()) else {
            continue;
        };
        if generation < keep_from {
            if let Err(e) = fs::remove_file(entry.path()) {
                warn!("Failed to prune {}: {}", entry.path().display(), e);
            }
        }
    }
    if let Ok(removed) = remove_stale_temps(dir) {
        if removed > 0 {
            debug!("Removed {} stale temp files from {}", removed, dir.display());
        }
    }
}

fn list_blocking(root: &Path) -> Result<Vec<CollectionInfo>, StoreError> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut infos = Vec::new();
    for entry in entries.flatten() {
        if !entry.file_type().is_ok_and(|t| t.is_dir()) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if validate_collection_name(&name).is_err() {
            continue;
        }
        match read_meta(&entry.path(), &name) {
            Ok(Some(meta)) => infos.push(CollectionInfo {
                name,
                records: meta.ids.len(),
                dimension: meta.dimension,
                generation: meta.generation,
            }),
            Ok(None) => {}
            Err(e) => warn!("Skipping collection '{}': {}", name, e),
        }
    }
    infos.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(infos)
}
