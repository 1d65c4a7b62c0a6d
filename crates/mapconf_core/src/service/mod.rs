//! Use-case services composed over the record repository.
//!
//! # Responsibility
//! - Parse client-shaped input before any row is touched.
//! - Keep callers (HTTP, assembly, CLI) decoupled from storage details.

pub mod dependency_service;
pub mod tree_service;
pub mod upsert_service;
