//! Domain model for persisted configuration records.
//!
//! # Responsibility
//! - Define the record shape shared by every configuration section.
//! - Keep section payloads schema-agnostic (`serde_json` maps).
//!
//! # Invariants
//! - Every record is identified by a store-wide unique `RecordId`.
//! - Parent/rank relations never cross a (section, project) boundary.

pub mod dependency;
pub mod record;
