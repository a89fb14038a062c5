//! Repository layer over the local SQLite store.
//!
//! # Responsibility
//! - Keep SQL inside the persistence boundary; services see typed records.
//! - Read through the `active_*` views so soft-deleted rows never surface.
//!
//! # Invariants
//! - Persisted enum strings are parsed once here; unknown values are
//!   reported as `InvalidData`, never masked.
//! - Repositories never open transactions themselves. Callers pass a
//!   `Transaction` (which derefs to `Connection`) when atomicity matters.

use crate::db::DbError;
use crate::model::submission::SubmissionId;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod reference_repo;
pub mod review_repo;
pub mod submission_repo;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound { entity: &'static str, id: String },
    InvalidData(String),
    /// Unique index rejected a write.
    UniqueViolation(String),
    /// Row changed since it was read.
    StaleVersion { id: SubmissionId, expected: i64 },
}

impl RepoError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UniqueViolation(message) => write!(f, "unique constraint violated: {message}"),
            Self::StaleVersion { id, expected } => {
                write!(f, "submission {id} changed since version {expected}")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ffi_err, message) = &value {
            if ffi_err.code == ErrorCode::ConstraintViolation
                && ffi_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            {
                return Self::UniqueViolation(message.clone().unwrap_or_else(|| value.to_string()));
            }
        }
        Self::Db(DbError::Sqlite(value))
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn parse_flag(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<SubmissionId> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

/// Parses a persisted enum string with the type's own `parse`.
pub(crate) fn parse_enum<T>(
    value: &str,
    column: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> RepoResult<T> {
    parse(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid value `{value}` in {column}")))
}

pub(crate) fn to_u32(value: i64, column: &str) -> RepoResult<u32> {
    u32::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("out of range value `{value}` in {column}")))
}
