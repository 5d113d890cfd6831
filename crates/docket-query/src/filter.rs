//! Post-ranking metadata filter.
//!
//! Candidates come in similarity order and leave in the same order, minus the
//! ones a [`Filter`] rejects. The date window needs a modification time for
//! each record, which [`MtimeResolver`] looks up in three places:
//!
//! 1. the live filesystem mtime of `file_path`, when that file exists
//! 2. `modified_time`, `mtime` or `file_mtime` in the record metadata
//! 3. the same keys (or `modified`) in `<raw_docs_dir>/<doc_id>.json`
//!
//! A record whose time cannot be resolved passes the date window.

use chrono::{DateTime, Local, NaiveDateTime, TimeDelta};
use docket_core::{Filter, Metadata, MetadataValue, ResolvedContext, META_DOC_ID, META_FILE_PATH};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const TIME_KEYS: [&str; 3] = ["modified_time", "mtime", "file_mtime"];
const RAW_TIME_KEYS: [&str; 4] = ["modified_time", "mtime", "file_mtime", "modified"];

/// Convert epoch seconds to a local wall-clock time.
fn epoch_to_local(secs: f64) -> Option<NaiveDateTime> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    DateTime::from_timestamp(whole as i64, nanos).map(|dt| dt.with_timezone(&Local).naive_local())
}

fn json_seconds(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Resolves a record's modification time.
#[derive(Debug, Clone, Default)]
pub struct MtimeResolver {
    raw_docs_dir: Option<PathBuf>,
}

impl MtimeResolver {
    /// `raw_docs_dir` enables the side-file lookup.
    #[must_use]
    pub fn new(raw_docs_dir: Option<PathBuf>) -> Self {
        Self { raw_docs_dir }
    }

    pub fn raw_docs_dir(&self) -> Option<&Path> {
        self.raw_docs_dir.as_deref()
    }

    /// First modification time found, in local time.
    #[must_use]
    pub fn resolve(&self, metadata: &Metadata) -> Option<NaiveDateTime> {
        let path = metadata
            .get(META_FILE_PATH)
            .and_then(MetadataValue::as_str)
            .unwrap_or("");

        Self::from_filesystem(path)
            .or_else(|| Self::from_metadata(metadata))
            .or_else(|| self.from_raw_doc(metadata))
    }

    fn from_filesystem(path: &str) -> Option<NaiveDateTime> {
        if path.is_empty() {
            return None;
        }
        match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => Some(DateTime::<Local>::from(modified).naive_local()),
            Err(e) => {
                debug!("No filesystem mtime for {}: {}", path, e);
                None
            }
        }
    }

    fn from_metadata(metadata: &Metadata) -> Option<NaiveDateTime> {
        TIME_KEYS
            .iter()
            .find_map(|key| metadata.get(*key).and_then(MetadataValue::as_f64))
            .and_then(epoch_to_local)
    }

    fn from_raw_doc(&self, metadata: &Metadata) -> Option<NaiveDateTime> {
        let dir = self.raw_docs_dir.as_ref()?;
        let doc_id = metadata
            .get(META_DOC_ID)
            .or_else(|| metadata.get("id"))
            .map(ToString::to_string)?;
        if doc_id.is_empty() || doc_id.contains(['/', '\\']) || doc_id.starts_with('.') {
            return None;
        }

        let path = dir.join(format!("{doc_id}.json"));
        let raw: Value = match fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string()))
        {
            Ok(raw) => raw,
            Err(e) => {
                debug!("No raw document time from {}: {}", path.display(), e);
                return None;
            }
        };

        RAW_TIME_KEYS
            .iter()
            .find_map(|key| raw.get(*key).and_then(json_seconds))
            .and_then(epoch_to_local)
    }
}

/// Filtering operations on [`Filter`].
pub trait FilterExt {
    /// Whether one record passes every constraint.
    fn matches(&self, metadata: &Metadata, resolver: &MtimeResolver) -> bool;

    /// Keep the passing candidates, preserving their order.
    fn apply(
        &self,
        candidates: Vec<ResolvedContext>,
        resolver: &MtimeResolver,
    ) -> Vec<ResolvedContext>;
}

impl FilterExt for Filter {
    fn matches(&self, metadata: &Metadata, resolver: &MtimeResolver) -> bool {
        let path = metadata
            .get(META_FILE_PATH)
            .and_then(MetadataValue::as_str)
            .unwrap_or("");

        if let Some(needle) = &self.path_contains {
            if !path.contains(needle.as_str()) {
                return false;
            }
        }

        if let Some(ext) = &self.file_extension {
            if !path.to_lowercase().ends_with(&ext.to_lowercase()) {
                return false;
            }
        }

        if self.has_date_window() {
            let Some(mtime) = resolver.resolve(metadata) else {
                return true;
            };
            if self.date_from.is_some_and(|from| mtime < from) {
                return false;
            }
            if self
                .date_to
                .is_some_and(|to| mtime > to + TimeDelta::days(1))
            {
                return false;
            }
        }

        true
    }

    fn apply(
        &self,
        candidates: Vec<ResolvedContext>,
        resolver: &MtimeResolver,
    ) -> Vec<ResolvedContext> {
        if self.is_empty() {
            return candidates;
        }
        let before = candidates.len();
        let kept: Vec<ResolvedContext> = candidates
            .into_iter()
            .filter(|c| self.matches(&c.metadata, resolver))
            .collect();
        debug!("Filter kept {} of {} candidates", kept.len(), before);
        kept
    }
}
