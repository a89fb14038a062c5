//! Workflow use-case services.
//!
//! # Responsibility
//! - Orchestrate validation, identity resolution, code generation and the
//!   review state machine into atomic operations.
//! - Keep network calls out of open write transactions.
//!
//! # Invariants
//! - Every multi-row mutation runs in one `Immediate` transaction.
//! - Strict identity lookups happen before the transaction starts;
//!   enrichment lookups happen after it commits.
//! - The submission row's `version` is checked on every update so a lost
//!   race surfaces as `Conflict` instead of an overwrite.

use crate::clock::Clock;
use crate::config::{ConfigError, EngineConfig};
use crate::identity::{IdentityResolver, OrgUnitDirectory, StaffDirectory, StudentDirectory};
use crate::model::actor::Actor;
use crate::storage::DocumentStore;
use std::sync::Arc;
use std::time::Instant;

pub mod code_generator;
pub mod error;
pub mod review_service;
pub mod submission_service;
pub mod team;
pub mod views;

pub use error::{FieldError, NotFoundTarget, WorkflowError, WorkflowResult};

/// Collaborators injected into every service call.
///
/// Cheap to clone; holds no connection. Each request opens or borrows its
/// own SQLite connection.
#[derive(Clone)]
pub struct EngineContext {
    pub config: EngineConfig,
    pub identity: IdentityResolver,
    pub documents: Arc<dyn DocumentStore>,
    pub clock: Arc<dyn Clock>,
}

impl EngineContext {
    /// Validates `config` and bounds every provider call by its timeout.
    pub fn new(
        config: EngineConfig,
        students: Arc<dyn StudentDirectory>,
        staff: Arc<dyn StaffDirectory>,
        org_units: Arc<dyn OrgUnitDirectory>,
        documents: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let identity =
            IdentityResolver::new(students, staff, org_units, config.provider_timeout());
        Ok(Self {
            config,
            identity,
            documents,
            clock,
        })
    }
}

/// Runs one operation and logs its outcome with a stable event line.
pub(crate) fn observed<T>(
    event: &'static str,
    actor: &Actor,
    subject: &dyn std::fmt::Display,
    operation: impl FnOnce() -> WorkflowResult<T>,
) -> WorkflowResult<T> {
    let started_at = Instant::now();
    log::debug!("event={event} module=service status=start actor={actor} subject={subject}");
    let result = operation();
    let duration_ms = started_at.elapsed().as_millis();
    match &result {
        Ok(_) => log::info!(
            "event={event} module=service status=ok actor={actor} subject={subject} duration_ms={duration_ms}"
        ),
        Err(err @ (WorkflowError::Repo(_) | WorkflowError::Storage(_))) => log::error!(
            "event={event} module=service status=error actor={actor} subject={subject} kind={} duration_ms={duration_ms} error={err}",
            err.kind()
        ),
        Err(err) => log::warn!(
            "event={event} module=service status=error actor={actor} subject={subject} kind={} duration_ms={duration_ms}",
            err.kind()
        ),
    }
    result
}
