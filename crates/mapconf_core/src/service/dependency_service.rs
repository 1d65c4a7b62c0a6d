//! Cross-section dependency resolution.
//!
//! # Responsibility
//! - Find records whose payload references a given record id.
//! - Gate destructive operations on the absence of dependents.
//!
//! # Invariants
//! - Scans are read-only.
//! - A guarded delete scans and deletes inside one write transaction, so no
//!   dependent can appear between the check and the delete.

use crate::model::dependency::build_report;
use crate::model::record::{RecordId, Section};
use crate::repo::record_repo::{RecordRepository, RepoResult};

pub use crate::model::dependency::{Dependent, DependencyReport, GuardedDelete};

/// Dependency resolver facade.
pub struct DependencyService<R: RecordRepository> {
    repo: R,
}

impl<R: RecordRepository> DependencyService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Scans each `(section, field)` pair of `look_for` for payloads whose
    /// `field` is `id` or an array containing `id`.
    pub fn check_dependencies(
        &self,
        id: RecordId,
        project: &str,
        look_for: &[(Section, &str)],
    ) -> RepoResult<DependencyReport> {
        build_report(id, look_for, |section| {
            self.repo.list_records(section, project)
        })
    }

    /// Deletes `id` only when no dependents are found through `look_for`.
    pub fn delete_unreferenced(
        &self,
        id: RecordId,
        section: Section,
        project: &str,
        look_for: &[(Section, &str)],
    ) -> RepoResult<GuardedDelete> {
        self.repo.delete_unreferenced(id, section, project, look_for)
    }
}
