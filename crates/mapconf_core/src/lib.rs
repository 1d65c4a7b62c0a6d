//! Hierarchical record store for map-service configuration.
//!
//! Records (sources, caches, layers, grids, ...) are grouped by project,
//! ordered into trees via parent/rank metadata, and cross-referenced by id.
//! This crate is the single source of truth for those invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, StoreConfig};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status, LoggingError};
pub use model::dependency::{Dependent, DependencyReport, GuardedDelete};
pub use model::record::{
    key_literal, payload_from_value, MalformedInput, Payload, Record, RecordId, RecordMeta,
    Section, TreeNode, UnknownSection,
};
pub use repo::record_repo::{
    ErrorKind, GetAllOptions, RecordRepository, RepoError, RepoResult, SqliteRecordRepository,
    UpsertOutcome,
};
pub use service::dependency_service::DependencyService;
pub use service::tree_service::TreeService;
pub use service::upsert_service::UpsertService;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
