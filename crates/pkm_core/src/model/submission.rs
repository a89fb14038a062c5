//! Submission aggregate and the records it owns.
//!
//! # Responsibility
//! - Define the submission root, team members, review records and reviewer
//!   assignments.
//! - Provide stable string mappings for every persisted status value.
//!
//! # Invariants
//! - `title_status`, `proposal_status` and `final_status` only take values
//!   from their enums.
//! - `proposal_status` is `None` until the first proposal document upload.
//! - Final status leaves `draft|submitted` only once both artifacts are
//!   accepted.

use crate::model::identity::{StaffKey, StudentKey};
use crate::model::reference::CategoryId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type SubmissionId = Uuid;
pub type AssignmentId = i64;
pub type ReviewRecordId = i64;

/// Opaque reference returned by the document store.
pub type DocumentRef = String;

/// Reviewable part of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Title,
    Proposal,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 2] = [ArtifactKind::Title, ArtifactKind::Proposal];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Proposal => "proposal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "title" => Some(Self::Title),
            "proposal" => Some(Self::Proposal),
            _ => None,
        }
    }
}

impl Display for ArtifactKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review sub-state of one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    UnderReview,
    Accepted,
    NeedsRevision,
    Rejected,
}

impl ReviewStatus {
    pub const ALL: [ReviewStatus; 5] = [
        ReviewStatus::Pending,
        ReviewStatus::UnderReview,
        ReviewStatus::Accepted,
        ReviewStatus::NeedsRevision,
        ReviewStatus::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UnderReview => "under_review",
            Self::Accepted => "accepted",
            Self::NeedsRevision => "needs_revision",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "under_review" => Some(Self::UnderReview),
            "accepted" => Some(Self::Accepted),
            "needs_revision" => Some(Self::NeedsRevision),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Whether a reviewer may record this value as an outcome.
    pub fn is_review_outcome(self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::NeedsRevision | Self::Rejected
        )
    }
}

impl Display for ReviewStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall result of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Draft,
    Submitted,
    Passed,
    Failed,
}

impl FinalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "submitted" => Some(Self::Submitted),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Announced results; nothing moves out of these.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }
}

impl Display for FinalStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one reviewer plotting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentState {
    /// Active; at most one per (submission, artifact).
    Assigned,
    /// Closed by the matching review record.
    Reviewed,
    /// Replaced by a newer assignment before any review.
    Superseded,
    /// Withdrawn by an administrator before any review.
    Cancelled,
}

impl AssignmentState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::Reviewed => "reviewed",
            Self::Superseded => "superseded",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "assigned" => Some(Self::Assigned),
            "reviewed" => Some(Self::Reviewed),
            "superseded" => Some(Self::Superseded),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Submission aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    /// Human-readable unique code, e.g. `PKM-K-2026-001`.
    pub code: String,
    /// Sequence part of `code`, kept as a column so it is never re-parsed.
    pub code_seq: u32,
    pub category_id: CategoryId,
    pub title: String,
    pub year: i32,
    pub lead_key: StudentKey,
    pub title_status: ReviewStatus,
    pub proposal_status: Option<ReviewStatus>,
    pub final_status: FinalStatus,
    pub proposal_document_ref: Option<DocumentRef>,
    pub title_reviewer_key: Option<StaffKey>,
    pub proposal_reviewer_key: Option<StaffKey>,
    pub title_review_note: Option<String>,
    pub proposal_review_note: Option<String>,
    /// Epoch ms of the latest title review.
    pub title_reviewed_at: Option<i64>,
    /// Epoch ms of the latest proposal review.
    pub proposal_reviewed_at: Option<i64>,
    /// Optimistic concurrency token, bumped by every write.
    pub version: i64,
    pub is_deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub updated_by: String,
}

impl Submission {
    /// Current status of one artifact; `None` for a proposal not yet uploaded.
    pub fn status_of(&self, artifact: ArtifactKind) -> Option<ReviewStatus> {
        match artifact {
            ArtifactKind::Title => Some(self.title_status),
            ArtifactKind::Proposal => self.proposal_status,
        }
    }

    pub fn reviewer_of(&self, artifact: ArtifactKind) -> Option<&StaffKey> {
        match artifact {
            ArtifactKind::Title => self.title_reviewer_key.as_ref(),
            ArtifactKind::Proposal => self.proposal_reviewer_key.as_ref(),
        }
    }

    pub fn is_lead(&self, identity: &str) -> bool {
        self.lead_key.as_str() == identity.trim()
    }
}

/// One member of a submission's active team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub member_key: StudentKey,
    pub is_lead: bool,
    /// 1-based; the lead is always 1.
    pub display_order: u32,
}

/// Append-only review history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: ReviewRecordId,
    pub submission_id: SubmissionId,
    pub artifact: ArtifactKind,
    pub assignment_id: AssignmentId,
    pub reviewer_key: StaffKey,
    pub outcome: ReviewStatus,
    pub note: String,
    pub reviewed_at: i64,
    /// Who actually wrote the record; differs from the reviewer on override.
    pub recorded_by: String,
    pub override_reason: Option<String>,
}

/// Reviewer plotting for one artifact of one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerAssignment {
    pub id: AssignmentId,
    pub submission_id: SubmissionId,
    pub artifact: ArtifactKind,
    pub reviewer_key: StaffKey,
    pub state: AssignmentState,
    pub assigned_at: i64,
    pub assigned_by: String,
    pub closed_at: Option<i64>,
}

/// One answer to a category-specific form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormAnswer {
    pub field_key: String,
    pub value: String,
}

impl FormAnswer {
    pub fn new(field_key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field_key: field_key.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ArtifactKind, AssignmentState, FinalStatus, ReviewStatus};

    #[test]
    fn persisted_strings_parse_back() {
        for status in ReviewStatus::ALL {
            assert_eq!(ReviewStatus::parse(status.as_str()), Some(status));
        }
        for artifact in ArtifactKind::ALL {
            assert_eq!(ArtifactKind::parse(artifact.as_str()), Some(artifact));
        }
        assert_eq!(FinalStatus::parse("passed"), Some(FinalStatus::Passed));
        assert_eq!(
            AssignmentState::parse("superseded"),
            Some(AssignmentState::Superseded)
        );
        assert_eq!(ReviewStatus::parse("ACC"), None);
    }

    #[test]
    fn only_terminal_review_values_are_outcomes() {
        assert!(!ReviewStatus::Pending.is_review_outcome());
        assert!(!ReviewStatus::UnderReview.is_review_outcome());
        assert!(ReviewStatus::Accepted.is_review_outcome());
        assert!(ReviewStatus::NeedsRevision.is_review_outcome());
        assert!(ReviewStatus::Rejected.is_review_outcome());
    }
}
