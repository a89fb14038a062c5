//! Submission workflow engine for the student grant (PKM) portal.
//!
//! The crate owns the submission lifecycle, its review state machines,
//! team rules, reviewer plotting and submission codes. Student, staff and
//! organizational records stay in external systems reached through the
//! `identity` provider traits.

pub mod clock;
pub mod config;
pub mod db;
pub mod identity;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod storage;
pub mod workflow;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, EngineConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use identity::{
    IdentityResolver, OrgUnitDirectory, ProviderError, ProviderKind, Resolution, StaffDirectory,
    StudentDirectory,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::actor::{Actor, Role};
pub use model::identity::{
    OrgUnitCode, OrgUnitRecord, StaffKey, StaffRecord, StudentKey, StudentRecord,
};
pub use model::reference::{Category, CategoryId, RegistrationWindow, WindowState};
pub use model::submission::{
    ArtifactKind, AssignmentState, FinalStatus, FormAnswer, ReviewRecord, ReviewStatus,
    ReviewerAssignment, Submission, SubmissionId, TeamMember,
};
pub use repo::submission_repo::SubmissionQuery;
pub use repo::{RepoError, RepoResult};
pub use service::review_service::{AssignReviewerRequest, ReviewService, SubmitReviewRequest};
pub use service::submission_service::{
    CreateSubmissionRequest, ProposalDocument, ReviseTitleRequest, SubmissionService,
};
pub use service::team::MemberInput;
pub use service::views::{SubmissionDetail, SubmissionPage, SubmissionSummary};
pub use service::{EngineContext, FieldError, NotFoundTarget, WorkflowError, WorkflowResult};
pub use storage::{DocumentStore, FsDocumentStore, StorageError, StorageLimits};
pub use workflow::TransitionError;

/// Minimal health-check API for embedding hosts.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
