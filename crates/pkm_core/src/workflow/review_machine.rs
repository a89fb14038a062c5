//! Transition table for title/proposal review and final announcement.
//!
//! Title and proposal each run an independent instance of the same table:
//!
//! | from           | trigger            | to             |
//! |----------------|--------------------|----------------|
//! | (none)         | submit (proposal)  | pending        |
//! | pending        | assign reviewer    | under_review   |
//! | under_review   | assign reviewer    | under_review   |
//! | under_review   | record outcome `o` | `o`            |
//! | under_review   | cancel assignment  | pending        |
//! | needs_revision | revise             | pending        |
//!
//! `o` must be one of `accepted | needs_revision | rejected`.

use crate::model::submission::{ArtifactKind, FinalStatus, ReviewStatus};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Event that asks an artifact's review status to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "trigger", content = "outcome")]
pub enum ReviewTrigger {
    /// First proposal upload; the title artifact is created with the submission.
    Submit,
    /// Administrator assigns or re-assigns a reviewer.
    AssignReviewer,
    /// Reviewer (or overriding administrator) records an outcome.
    RecordOutcome(ReviewStatus),
    /// Administrator withdraws an assignment nobody has reviewed yet.
    CancelAssignment,
    /// Lead revises the title or re-uploads the proposal.
    Revise,
}

impl ReviewTrigger {
    /// Status this trigger tries to reach.
    pub fn attempted(self) -> ReviewStatus {
        match self {
            Self::Submit | Self::CancelAssignment | Self::Revise => ReviewStatus::Pending,
            Self::AssignReviewer => ReviewStatus::UnderReview,
            Self::RecordOutcome(outcome) => outcome,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::AssignReviewer => "assign_reviewer",
            Self::RecordOutcome(_) => "record_outcome",
            Self::CancelAssignment => "cancel_assignment",
            Self::Revise => "revise",
        }
    }
}

/// Illegal status change, naming where the submission was and where the
/// caller tried to take it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TransitionError {
    /// Artifact status cannot move via this trigger.
    Review {
        artifact: ArtifactKind,
        current: Option<ReviewStatus>,
        attempted: ReviewStatus,
        trigger: &'static str,
    },
    /// An operation on one artifact requires another artifact's status.
    Precondition {
        artifact: ArtifactKind,
        required: ReviewStatus,
        current: Option<ReviewStatus>,
        action: &'static str,
    },
    /// Announcement is not legal for the current statuses.
    Final {
        current: FinalStatus,
        attempted: FinalStatus,
        title: ReviewStatus,
        proposal: Option<ReviewStatus>,
    },
}

fn status_label(status: Option<ReviewStatus>) -> &'static str {
    status.map_or("not_submitted", ReviewStatus::as_str)
}

impl Display for TransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Review {
                artifact,
                current,
                attempted,
                trigger,
            } => write!(
                f,
                "{artifact} cannot move from {} to {attempted} via {trigger}",
                status_label(*current)
            ),
            Self::Precondition {
                artifact,
                required,
                current,
                action,
            } => write!(
                f,
                "{action} requires {artifact} status {required}, current status is {}",
                status_label(*current)
            ),
            Self::Final {
                current,
                attempted,
                title,
                proposal,
            } => write!(
                f,
                "final status cannot move from {current} to {attempted} (title {title}, proposal {})",
                status_label(*proposal)
            ),
        }
    }
}

impl Error for TransitionError {}

/// Computes the status an artifact moves to, or rejects the transition.
pub fn next_status(
    artifact: ArtifactKind,
    current: Option<ReviewStatus>,
    trigger: ReviewTrigger,
) -> Result<ReviewStatus, TransitionError> {
    use ReviewStatus::{NeedsRevision, Pending, UnderReview};

    let next = match (current, trigger) {
        (None, ReviewTrigger::Submit) if artifact == ArtifactKind::Proposal => Some(Pending),
        (Some(Pending), ReviewTrigger::AssignReviewer) => Some(UnderReview),
        (Some(UnderReview), ReviewTrigger::AssignReviewer) => Some(UnderReview),
        (Some(UnderReview), ReviewTrigger::RecordOutcome(outcome))
            if outcome.is_review_outcome() =>
        {
            Some(outcome)
        }
        (Some(UnderReview), ReviewTrigger::CancelAssignment) => Some(Pending),
        (Some(NeedsRevision), ReviewTrigger::Revise) => Some(Pending),
        _ => None,
    };

    next.ok_or(TransitionError::Review {
        artifact,
        current,
        attempted: trigger.attempted(),
        trigger: trigger.as_str(),
    })
}

/// Gate for operations that depend on another artifact's status.
pub fn require_status(
    artifact: ArtifactKind,
    current: Option<ReviewStatus>,
    required: ReviewStatus,
    action: &'static str,
) -> Result<(), TransitionError> {
    if current == Some(required) {
        return Ok(());
    }
    Err(TransitionError::Precondition {
        artifact,
        required,
        current,
        action,
    })
}

/// Computes the announced final status.
///
/// Legal only from `draft|submitted`, towards `passed|failed`, and only when
/// both artifacts are accepted.
pub fn announce_final(
    current: FinalStatus,
    attempted: FinalStatus,
    title: ReviewStatus,
    proposal: Option<ReviewStatus>,
) -> Result<FinalStatus, TransitionError> {
    let both_accepted =
        title == ReviewStatus::Accepted && proposal == Some(ReviewStatus::Accepted);
    if !current.is_terminal() && attempted.is_terminal() && both_accepted {
        return Ok(attempted);
    }
    Err(TransitionError::Final {
        current,
        attempted,
        title,
        proposal,
    })
}

#[cfg(test)]
mod tests {
    use super::{announce_final, next_status, require_status, ReviewTrigger, TransitionError};
    use crate::model::submission::{ArtifactKind, FinalStatus, ReviewStatus};

    const TRIGGERS: [ReviewTrigger; 9] = [
        ReviewTrigger::Submit,
        ReviewTrigger::AssignReviewer,
        ReviewTrigger::RecordOutcome(ReviewStatus::Pending),
        ReviewTrigger::RecordOutcome(ReviewStatus::UnderReview),
        ReviewTrigger::RecordOutcome(ReviewStatus::Accepted),
        ReviewTrigger::RecordOutcome(ReviewStatus::NeedsRevision),
        ReviewTrigger::RecordOutcome(ReviewStatus::Rejected),
        ReviewTrigger::CancelAssignment,
        ReviewTrigger::Revise,
    ];

    fn legal_count(artifact: ArtifactKind, current: Option<ReviewStatus>) -> usize {
        TRIGGERS
            .iter()
            .filter(|trigger| next_status(artifact, current, **trigger).is_ok())
            .count()
    }

    #[test]
    fn table_matches_documented_edges() {
        use ReviewStatus::*;
        let title = ArtifactKind::Title;

        assert_eq!(
            next_status(title, Some(Pending), ReviewTrigger::AssignReviewer),
            Ok(UnderReview)
        );
        assert_eq!(
            next_status(title, Some(UnderReview), ReviewTrigger::AssignReviewer),
            Ok(UnderReview)
        );
        assert_eq!(
            next_status(title, Some(UnderReview), ReviewTrigger::RecordOutcome(Accepted)),
            Ok(Accepted)
        );
        assert_eq!(
            next_status(title, Some(UnderReview), ReviewTrigger::CancelAssignment),
            Ok(Pending)
        );
        assert_eq!(
            next_status(title, Some(NeedsRevision), ReviewTrigger::Revise),
            Ok(Pending)
        );

        assert_eq!(legal_count(title, Some(Pending)), 1);
        assert_eq!(legal_count(title, Some(UnderReview)), 5);
        assert_eq!(legal_count(title, Some(Accepted)), 0);
        assert_eq!(legal_count(title, Some(Rejected)), 0);
        assert_eq!(legal_count(title, Some(NeedsRevision)), 1);
    }

    #[test]
    fn only_the_proposal_starts_from_nothing() {
        assert_eq!(
            next_status(ArtifactKind::Proposal, None, ReviewTrigger::Submit),
            Ok(ReviewStatus::Pending)
        );
        assert!(next_status(ArtifactKind::Title, None, ReviewTrigger::Submit).is_err());
        assert_eq!(legal_count(ArtifactKind::Proposal, None), 1);
    }

    #[test]
    fn rejection_names_current_and_attempted_status() {
        let err = next_status(
            ArtifactKind::Title,
            Some(ReviewStatus::Pending),
            ReviewTrigger::RecordOutcome(ReviewStatus::Accepted),
        )
        .unwrap_err();
        assert_eq!(
            err,
            TransitionError::Review {
                artifact: ArtifactKind::Title,
                current: Some(ReviewStatus::Pending),
                attempted: ReviewStatus::Accepted,
                trigger: "record_outcome",
            }
        );
        let message = err.to_string();
        assert!(message.contains("pending"));
        assert!(message.contains("accepted"));
    }

    #[test]
    fn precondition_gate_reports_missing_requirement() {
        assert!(require_status(
            ArtifactKind::Title,
            Some(ReviewStatus::Accepted),
            ReviewStatus::Accepted,
            "upload proposal"
        )
        .is_ok());
        let err = require_status(
            ArtifactKind::Title,
            Some(ReviewStatus::Pending),
            ReviewStatus::Accepted,
            "upload proposal",
        )
        .unwrap_err();
        assert!(err.to_string().contains("upload proposal requires title status accepted"));
    }

    #[test]
    fn announcement_requires_both_artifacts_accepted() {
        use ReviewStatus::*;
        assert_eq!(
            announce_final(FinalStatus::Draft, FinalStatus::Passed, Accepted, Some(Accepted)),
            Ok(FinalStatus::Passed)
        );
        assert_eq!(
            announce_final(FinalStatus::Submitted, FinalStatus::Failed, Accepted, Some(Accepted)),
            Ok(FinalStatus::Failed)
        );

        for (title, proposal) in [
            (Pending, None),
            (Accepted, None),
            (Accepted, Some(UnderReview)),
            (NeedsRevision, Some(Accepted)),
            (Accepted, Some(Rejected)),
        ] {
            assert!(
                announce_final(FinalStatus::Draft, FinalStatus::Passed, title, proposal).is_err()
            );
        }
    }

    #[test]
    fn announcement_is_one_way() {
        use ReviewStatus::Accepted;
        assert!(announce_final(FinalStatus::Passed, FinalStatus::Failed, Accepted, Some(Accepted))
            .is_err());
        assert!(announce_final(FinalStatus::Draft, FinalStatus::Submitted, Accepted, Some(Accepted))
            .is_err());
        assert!(announce_final(FinalStatus::Draft, FinalStatus::Draft, Accepted, Some(Accepted))
            .is_err());
    }
}
