//! Caller context supplied by the boundary layer.
//!
//! Authentication happens outside the engine; this module only models the
//! already-authenticated identity and role attached to each call.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Role of the authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Portal administrator; orchestrates reviewer assignment and announcements.
    Admin,
    /// Student account; may lead a team.
    Student,
    /// Staff account acting as reviewer.
    Reviewer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Student => "student",
            Self::Reviewer => "reviewer",
        }
    }
}

/// Authenticated caller of one engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Caller identity key: student key, staff key, or admin account id.
    pub identity: String,
    pub role: Role,
}

impl Actor {
    pub fn new(identity: impl Into<String>, role: Role) -> Self {
        Self {
            identity: identity.into(),
            role,
        }
    }

    pub fn admin(identity: impl Into<String>) -> Self {
        Self::new(identity, Role::Admin)
    }

    pub fn student(identity: impl Into<String>) -> Self {
        Self::new(identity, Role::Student)
    }

    pub fn reviewer(identity: impl Into<String>) -> Self {
        Self::new(identity, Role::Reviewer)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Value written into `updated_by` audit columns.
    pub fn audit_label(&self) -> String {
        format!("{}:{}", self.role.as_str(), self.identity)
    }
}

impl Display for Actor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.role.as_str(), self.identity)
    }
}
