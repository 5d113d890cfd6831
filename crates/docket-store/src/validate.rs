//! Batch validation shared by every backend.

use std::collections::HashSet;

use docket_core::{Record, StoreError};

/// Check that `name` can safely name a collection directory.
///
/// Accepts `[A-Za-z0-9._-]+` except `.` and `..`.
pub fn validate_collection_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidCollectionName(name.to_string()))
    }
}

/// Validate a batch against the collection's current state.
///
/// `dimension` is the established dimension, `None` for a new collection (the
/// first record then sets it). Returns the dimension the collection will have.
pub(crate) fn validate_batch<'a>(
    dimension: Option<usize>,
    existing: impl Fn(&str) -> bool,
    records: &'a [Record],
) -> Result<usize, StoreError> {
    let expected = match (dimension, records.first()) {
        (Some(d), _) => d,
        (None, Some(first)) => first.embedding.len(),
        (None, None) => return Ok(0),
    };

    let mut seen: HashSet<&'a str> = HashSet::with_capacity(records.len());
    for record in records {
        if record.embedding.is_empty() {
            return Err(StoreError::InvalidEmbedding {
                id: record.id.clone(),
                reason: "empty vector".to_string(),
            });
        }
        if record.embedding.len() != expected {
            return Err(StoreError::DimensionMismatch {
                id: record.id.clone(),
                expected,
                actual: record.embedding.len(),
            });
        }
        if record.embedding.iter().any(|v| !v.is_finite()) {
            return Err(StoreError::InvalidEmbedding {
                id: record.id.clone(),
                reason: "non-finite value".to_string(),
            });
        }
        if !seen.insert(record.id.as_str()) || existing(&record.id) {
            return Err(StoreError::DuplicateId(record.id.clone()));
        }
    }

    Ok(expected)
}
