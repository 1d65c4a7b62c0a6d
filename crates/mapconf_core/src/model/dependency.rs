//! Cross-section reference model.
//!
//! # Invariants
//! - A section without dependents never appears in a report.
//! - A dependent is listed at most once per section.

use crate::model::record::{find_field, Record, RecordId, Section};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Minimal description of a record that references another one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependent {
    #[serde(rename = "_id")]
    pub id: RecordId,
    /// `name` read from the same payload scope as the referencing field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Dependents grouped by the section they live in.
pub type DependencyReport = BTreeMap<Section, Vec<Dependent>>;

/// Outcome of a delete guarded by a dependency scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardedDelete {
    Deleted,
    NotFound,
    /// Nothing was removed; these records still reference the target.
    Blocked(DependencyReport),
}

/// Scans each `(section, field)` pair of `look_for` for payloads whose
/// `field` is `id` or an array containing `id`.
///
/// `load` yields the records of one section; it decides which connection or
/// transaction the scan reads from.
pub fn build_report<E>(
    id: RecordId,
    look_for: &[(Section, &str)],
    mut load: impl FnMut(Section) -> Result<Vec<Record>, E>,
) -> Result<DependencyReport, E> {
    let mut report = DependencyReport::new();
    for &(section, field) in look_for {
        for record in load(section)? {
            let Some((scope, value)) = find_field(&record.data, field) else {
                continue;
            };
            if !references(value, id) {
                continue;
            }
            let dependents = report.entry(section).or_default();
            if dependents.iter().any(|known| known.id == record.id) {
                continue;
            }
            dependents.push(Dependent {
                id: record.id,
                name: scope.get("name").and_then(Value::as_str).map(str::to_string),
            });
        }
    }
    Ok(report)
}

fn references(value: &Value, id: RecordId) -> bool {
    match value {
        Value::Array(items) => items.iter().any(|item| item.as_i64() == Some(id)),
        other => other.as_i64() == Some(id),
    }
}
