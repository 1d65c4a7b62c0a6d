//! Repository layer over the `records` table.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository APIs distinguish semantic outcomes (`NotFound`, integrity
//!   violations, malformed input) from storage transport errors.

pub mod record_repo;
