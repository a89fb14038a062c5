//! Domain model for the submission workflow.
//!
//! # Responsibility
//! - Define the submission aggregate and the records it owns.
//! - Define identity keys pointing into external reference systems.
//! - Define the caller context handed in by the boundary layer.
//!
//! # Invariants
//! - Status values are closed enums; persisted strings are parsed once at
//!   the repository boundary and never compared as raw text elsewhere.
//! - Deletion is represented by soft-delete flags, not hard delete.

pub mod actor;
pub mod identity;
pub mod reference;
pub mod submission;
