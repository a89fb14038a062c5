//! Review and announcement state machines.
//!
//! # Responsibility
//! - Own the legal transition table for artifact review statuses.
//! - Own the one-way announcement transition for final status.
//!
//! # Invariants
//! - Every status change in the engine is computed here; services never
//!   assign a status value they did not get back from this module.

pub mod review_machine;

pub use review_machine::{
    announce_final, next_status, require_status, ReviewTrigger, TransitionError,
};
