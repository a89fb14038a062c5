//! Error taxonomy shared by every workflow operation.

use crate::db::DbError;
use crate::identity::ProviderError;
use crate::model::identity::{StaffKey, StudentKey};
use crate::model::reference::{CategoryId, WindowState};
use crate::model::submission::{ArtifactKind, SubmissionId};
use crate::repo::RepoError;
use crate::storage::StorageError;
use crate::workflow::TransitionError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Field-level input problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Input path, e.g. `title` or `members[2].key`.
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFoundTarget {
    Submission(SubmissionId),
    Category(CategoryId),
    Assignment {
        submission_id: SubmissionId,
        artifact: ArtifactKind,
    },
}

impl Display for NotFoundTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submission(id) => write!(f, "submission {id}"),
            Self::Category(id) => write!(f, "category {id}"),
            Self::Assignment {
                submission_id,
                artifact,
            } => write!(f, "active {artifact} assignment on submission {submission_id}"),
        }
    }
}

#[derive(Debug)]
pub enum WorkflowError {
    Validation(FieldError),
    InvalidTransition(TransitionError),
    NotFound(NotFoundTarget),
    NotPermitted {
        actor: String,
        action: &'static str,
    },
    RegistrationClosed(WindowState),
    /// Strict lookup missed these student keys.
    UnresolvedMember(Vec<StudentKey>),
    UnresolvedReviewer(StaffKey),
    DependencyUnavailable(ProviderError),
    /// A concurrent writer changed the row first.
    Conflict {
        target: String,
        detail: String,
    },
    Storage(StorageError),
    Repo(RepoError),
}

impl WorkflowError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(FieldError::new(field, message))
    }

    pub(crate) fn not_permitted(actor: &crate::model::actor::Actor, action: &'static str) -> Self {
        Self::NotPermitted {
            actor: actor.audit_label(),
            action,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DependencyUnavailable(_) | Self::Conflict { .. }
        )
    }

    /// Stable machine-readable class name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::NotFound(_) => "not_found",
            Self::NotPermitted { .. } => "not_permitted",
            Self::RegistrationClosed(_) => "registration_closed",
            Self::UnresolvedMember(_) => "unresolved_member",
            Self::UnresolvedReviewer(_) => "unresolved_reviewer",
            Self::DependencyUnavailable(_) => "dependency_unavailable",
            Self::Conflict { .. } => "conflict",
            Self::Storage(_) => "storage",
            Self::Repo(_) => "repo",
        }
    }
}

impl Display for WorkflowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "invalid input: {err}"),
            Self::InvalidTransition(err) => write!(f, "invalid transition: {err}"),
            Self::NotFound(target) => write!(f, "not found: {target}"),
            Self::NotPermitted { actor, action } => write!(f, "{actor} may not {action}"),
            Self::RegistrationClosed(state) => write!(f, "registration is closed: {state:?}"),
            Self::UnresolvedMember(keys) => {
                let keys: Vec<&str> = keys.iter().map(StudentKey::as_str).collect();
                write!(f, "students not found in student records: {}", keys.join(", "))
            }
            Self::UnresolvedReviewer(key) => {
                write!(f, "reviewer {key} not found in staff records")
            }
            Self::DependencyUnavailable(err) => write!(f, "{err}"),
            Self::Conflict { target, detail } => write!(f, "conflict on {target}: {detail}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for WorkflowError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidTransition(err) => Some(err),
            Self::DependencyUnavailable(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransitionError> for WorkflowError {
    fn from(value: TransitionError) -> Self {
        Self::InvalidTransition(value)
    }
}

impl From<StorageError> for WorkflowError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

impl From<RepoError> for WorkflowError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::StaleVersion { id, expected } => Self::Conflict {
                target: format!("submission {id}"),
                detail: format!("version {expected} is no longer current"),
            },
            other => Self::Repo(other),
        }
    }
}

impl From<DbError> for WorkflowError {
    fn from(value: DbError) -> Self {
        Self::Repo(RepoError::Db(value))
    }
}

impl From<rusqlite::Error> for WorkflowError {
    fn from(value: rusqlite::Error) -> Self {
        Self::from(RepoError::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::WorkflowError;
    use crate::identity::{ProviderError, ProviderKind};
    use crate::repo::RepoError;
    use uuid::Uuid;

    #[test]
    fn stale_version_surfaces_as_retryable_conflict() {
        let err = WorkflowError::from(RepoError::StaleVersion {
            id: Uuid::nil(),
            expected: 3,
        });
        assert_eq!(err.kind(), "conflict");
        assert!(err.is_retryable());
    }

    #[test]
    fn provider_failure_is_retryable_but_validation_is_not() {
        let unavailable = WorkflowError::DependencyUnavailable(ProviderError::unavailable(
            ProviderKind::Students,
            "connection refused",
        ));
        assert!(unavailable.is_retryable());
        assert!(!WorkflowError::validation("title", "too short").is_retryable());
    }
}
