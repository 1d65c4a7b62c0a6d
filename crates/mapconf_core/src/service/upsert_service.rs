//! Keyed upsert for re-imported documents.
//!
//! # Responsibility
//! - Decide between update-in-place and insert for fetched documents
//!   (e.g. WMS capabilities keyed by their URL).
//!
//! # Invariants
//! - A record matches only when its parsed key value equals the incoming
//!   one; the serialized-text search is a prefilter.
//! - A match keeps its id and `manual` flag; new rows are inserted with
//!   `manual = false`.

use crate::model::record::{find_field, Payload, Section};
use crate::repo::record_repo::{RecordRepository, RepoError, RepoResult, UpsertOutcome};

/// Upsert matcher facade.
pub struct UpsertService<R: RecordRepository> {
    repo: R,
}

impl<R: RecordRepository> UpsertService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Replaces the record carrying the same `key_field` value as `payload`,
    /// or inserts `payload` as a new record.
    pub fn upsert_by_key(
        &self,
        section: Section,
        project: &str,
        key_field: &str,
        payload: &Payload,
    ) -> RepoResult<UpsertOutcome> {
        let value = match find_field(payload, key_field) {
            Some((_, value)) if !value.is_null() => value,
            _ => {
                return Err(RepoError::MalformedInput(format!(
                    "payload has no `{key_field}` value"
                )))
            }
        };
        self.repo
            .upsert_matching(section, project, key_field, value, payload)
    }
}
