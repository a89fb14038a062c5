//! Reviewer plotting and review submission.
//!
//! # Responsibility
//! - Assign, re-assign and cancel reviewers per artifact.
//! - Record review outcomes and drive the artifact's review status.
//!
//! # Invariants
//! - At most one open assignment per (submission, artifact).
//! - A status only moves to an outcome together with the review record and
//!   the assignment closing, in one transaction.
//! - An administrator recording a review for someone else's assignment must
//!   give a reason, which is stored with the record.

use super::error::{NotFoundTarget, WorkflowError, WorkflowResult};
use super::views::{work_items, ReviewerWorkItem};
use super::{observed, EngineContext};
use crate::identity::StrictLookupError;
use crate::model::actor::{Actor, Role};
use crate::model::identity::StaffKey;
use crate::model::submission::{
    ArtifactKind, AssignmentState, ReviewRecord, ReviewStatus, ReviewerAssignment, Submission,
    SubmissionId,
};
use crate::repo::review_repo::{NewReviewRecord, ReviewRepository, SqliteReviewRepository};
use crate::repo::submission_repo::{SqliteSubmissionRepository, SubmissionRepository};
use crate::workflow::{next_status, ReviewTrigger, TransitionError};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignReviewerRequest {
    pub submission_id: SubmissionId,
    pub artifact: ArtifactKind,
    pub reviewer_key: StaffKey,
    /// Version the caller last saw. When absent, the version read at the
    /// start of the call is used.
    #[serde(default)]
    pub expected_version: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReviewRequest {
    pub submission_id: SubmissionId,
    pub artifact: ArtifactKind,
    pub outcome: ReviewStatus,
    pub note: String,
    /// Required when an administrator records a review for an assignment
    /// held by another reviewer.
    #[serde(default)]
    pub override_reason: Option<String>,
}

pub struct ReviewService<'a> {
    conn: &'a mut Connection,
    ctx: &'a EngineContext,
}

impl<'a> ReviewService<'a> {
    pub fn new(conn: &'a mut Connection, ctx: &'a EngineContext) -> Self {
        Self { conn, ctx }
    }

    /// Plots `reviewer_key` onto one artifact and moves it to `under_review`.
    ///
    /// # Contract
    /// - Artifact status must be `pending` or `under_review`; a proposal also
    ///   needs its stored document.
    /// - The reviewer must resolve in staff records and have an email.
    /// - A previous open assignment is superseded.
    /// - A concurrent change to the submission yields `Conflict`.
    pub fn assign_reviewer(
        &mut self,
        actor: &Actor,
        request: &AssignReviewerRequest,
    ) -> WorkflowResult<ReviewerAssignment> {
        let id = request.submission_id;
        observed("reviewer_assign", actor, &id, || {
            self.assign_reviewer_inner(actor, request)
        })
    }

    fn assign_reviewer_inner(
        &mut self,
        actor: &Actor,
        request: &AssignReviewerRequest,
    ) -> WorkflowResult<ReviewerAssignment> {
        if !actor.is_admin() {
            return Err(WorkflowError::not_permitted(actor, "assign reviewers"));
        }
        let ctx = self.ctx;
        let id = request.submission_id;
        let artifact = request.artifact;
        let current = SqliteSubmissionRepository::new(self.conn)
            .get_submission(id)?
            .ok_or(WorkflowError::NotFound(NotFoundTarget::Submission(id)))?;
        let expected_version = request.expected_version.unwrap_or(current.version);
        next_status(
            artifact,
            current.status_of(artifact),
            ReviewTrigger::AssignReviewer,
        )?;
        if artifact == ArtifactKind::Proposal {
            ensure_document_present(ctx, &current)?;
        }

        let reviewer = match ctx.identity.require_staff(&request.reviewer_key) {
            Ok(record) => record,
            Err(StrictLookupError::Missing(_)) => {
                return Err(WorkflowError::UnresolvedReviewer(request.reviewer_key.clone()))
            }
            Err(StrictLookupError::Unavailable(err)) => {
                return Err(WorkflowError::DependencyUnavailable(err))
            }
        };
        if reviewer.email.as_deref().map_or(true, |email| email.trim().is_empty()) {
            return Err(WorkflowError::validation(
                "reviewer_key",
                format!("reviewer {} has no institutional email", reviewer.key),
            ));
        }

        let now = ctx.clock.now_epoch_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let assignment = {
            let submissions = SqliteSubmissionRepository::new(&tx);
            let reviews = SqliteReviewRepository::new(&tx);
            let fresh = load_for_update(&tx, id, expected_version)?;
            let next = next_status(
                artifact,
                fresh.status_of(artifact),
                ReviewTrigger::AssignReviewer,
            )?;

            if let Some(previous) = reviews.active_assignment(id, artifact)? {
                reviews.close_assignment(previous.id, AssignmentState::Superseded, now)?;
                log::info!(
                    "event=assignment_superseded module=service status=ok id={id} artifact={artifact} previous_reviewer={}",
                    previous.reviewer_key
                );
            }
            let assignment = reviews.insert_assignment(
                id,
                artifact,
                &request.reviewer_key,
                now,
                &actor.audit_label(),
            )?;

            let mut updated = fresh.clone();
            set_artifact(&mut updated, artifact, next, Some(request.reviewer_key.clone()));
            stamp(&mut updated, actor, now);
            submissions.update_submission(&updated, fresh.version)?;
            assignment
        };
        tx.commit()?;
        Ok(assignment)
    }

    /// Withdraws the open assignment and returns the artifact to `pending`.
    ///
    /// Rejected with `InvalidTransition` once the assignment has been
    /// reviewed.
    pub fn cancel_assignment(
        &mut self,
        actor: &Actor,
        submission_id: SubmissionId,
        artifact: ArtifactKind,
    ) -> WorkflowResult<ReviewerAssignment> {
        observed("assignment_cancel", actor, &submission_id, || {
            if !actor.is_admin() {
                return Err(WorkflowError::not_permitted(actor, "cancel assignments"));
            }
            let now = self.ctx.clock.now_epoch_ms();
            let tx = self
                .conn
                .transaction_with_behavior(TransactionBehavior::Immediate)?;
            let cancelled = {
                let submissions = SqliteSubmissionRepository::new(&tx);
                let reviews = SqliteReviewRepository::new(&tx);
                let current = submissions
                    .get_submission(submission_id)?
                    .ok_or(WorkflowError::NotFound(NotFoundTarget::Submission(
                        submission_id,
                    )))?;
                let status = current.status_of(artifact);
                let next = next_status(artifact, status, ReviewTrigger::CancelAssignment)?;
                let open = reviews.active_assignment(submission_id, artifact)?.ok_or(
                    WorkflowError::NotFound(NotFoundTarget::Assignment {
                        submission_id,
                        artifact,
                    }),
                )?;
                if reviews.has_review_for_assignment(open.id)? {
                    return Err(WorkflowError::InvalidTransition(TransitionError::Review {
                        artifact,
                        current: status,
                        attempted: next,
                        trigger: ReviewTrigger::CancelAssignment.as_str(),
                    }));
                }

                reviews.close_assignment(open.id, AssignmentState::Cancelled, now)?;
                let mut updated = current.clone();
                set_artifact(&mut updated, artifact, next, None);
                stamp(&mut updated, actor, now);
                submissions.update_submission(&updated, current.version)?;
                ReviewerAssignment {
                    state: AssignmentState::Cancelled,
                    closed_at: Some(now),
                    ..open
                }
            };
            tx.commit()?;
            Ok(cancelled)
        })
    }

    /// Records an outcome for the caller's open assignment.
    ///
    /// # Contract
    /// - Reviewers may only review their own assignment.
    /// - Administrators may record on behalf of the assigned reviewer with a
    ///   non-blank `override_reason`; the record keeps both identities.
    /// - Record, status change and assignment closing commit together.
    pub fn submit_review(
        &mut self,
        actor: &Actor,
        request: &SubmitReviewRequest,
    ) -> WorkflowResult<ReviewRecord> {
        let id = request.submission_id;
        observed("review_submit", actor, &id, || {
            self.submit_review_inner(actor, request)
        })
    }

    fn submit_review_inner(
        &mut self,
        actor: &Actor,
        request: &SubmitReviewRequest,
    ) -> WorkflowResult<ReviewRecord> {
        if actor.role == Role::Student {
            return Err(WorkflowError::not_permitted(actor, "submit reviews"));
        }
        let ctx = self.ctx;
        let note = request.note.trim();
        if note.chars().count() < ctx.config.review_note_min_chars {
            return Err(WorkflowError::validation(
                "note",
                format!(
                    "must be at least {} characters",
                    ctx.config.review_note_min_chars
                ),
            ));
        }
        if !request.outcome.is_review_outcome() {
            return Err(WorkflowError::validation(
                "outcome",
                format!("`{}` is not a review outcome", request.outcome),
            ));
        }

        let id = request.submission_id;
        let artifact = request.artifact;
        let now = ctx.clock.now_epoch_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let record = {
            let submissions = SqliteSubmissionRepository::new(&tx);
            let reviews = SqliteReviewRepository::new(&tx);
            let current = submissions
                .get_submission(id)?
                .ok_or(WorkflowError::NotFound(NotFoundTarget::Submission(id)))?;
            let next = next_status(
                artifact,
                current.status_of(artifact),
                ReviewTrigger::RecordOutcome(request.outcome),
            )?;
            let open = reviews.active_assignment(id, artifact)?.ok_or(
                WorkflowError::NotFound(NotFoundTarget::Assignment {
                    submission_id: id,
                    artifact,
                }),
            )?;
            let override_reason = review_override(actor, &open, request)?;

            let record = reviews.insert_review_record(&NewReviewRecord {
                submission_id: id,
                artifact,
                assignment_id: open.id,
                reviewer_key: &open.reviewer_key,
                outcome: next,
                note,
                reviewed_at: now,
                recorded_by: &actor.audit_label(),
                override_reason,
            })?;
            reviews.close_assignment(open.id, AssignmentState::Reviewed, now)?;

            let mut updated = current.clone();
            set_artifact(&mut updated, artifact, next, Some(open.reviewer_key.clone()));
            match artifact {
                ArtifactKind::Title => {
                    updated.title_review_note = Some(note.to_string());
                    updated.title_reviewed_at = Some(now);
                }
                ArtifactKind::Proposal => {
                    updated.proposal_review_note = Some(note.to_string());
                    updated.proposal_reviewed_at = Some(now);
                }
            }
            stamp(&mut updated, actor, now);
            submissions.update_submission(&updated, current.version)?;
            record
        };
        tx.commit()?;

        if let Some(reason) = &record.override_reason {
            log::warn!(
                "event=review_override module=service status=ok id={id} artifact={artifact} assigned_reviewer={} recorded_by={} reason_chars={}",
                record.reviewer_key,
                record.recorded_by,
                reason.chars().count()
            );
        }
        Ok(record)
    }

    /// Worklist of one reviewer: open assignments first, then reviewed ones.
    ///
    /// Reviewers may only list their own; administrators may list anyone's.
    pub fn list_reviewer_assignments(
        &self,
        actor: &Actor,
        reviewer_key: &StaffKey,
        artifact: Option<ArtifactKind>,
    ) -> WorkflowResult<Vec<ReviewerWorkItem>> {
        let own = actor.role == Role::Reviewer && actor.identity.trim() == reviewer_key.as_str();
        if !own && !actor.is_admin() {
            return Err(WorkflowError::not_permitted(
                actor,
                "list another reviewer's assignments",
            ));
        }
        let submissions = SqliteSubmissionRepository::new(self.conn);
        let assignments = SqliteReviewRepository::new(self.conn)
            .list_assignments_for_reviewer(reviewer_key, artifact)?;
        let mut rows = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            if let Some(submission) = submissions.get_submission(assignment.submission_id)? {
                rows.push((assignment, submission));
            }
        }
        Ok(work_items(self.ctx, rows))
    }
}

/// Reloads the submission inside the write transaction and checks it is
/// still at the version the caller decided on.
fn load_for_update(
    tx: &Transaction<'_>,
    id: SubmissionId,
    expected_version: i64,
) -> WorkflowResult<Submission> {
    let fresh = SqliteSubmissionRepository::new(tx)
        .get_submission(id)?
        .ok_or(WorkflowError::NotFound(NotFoundTarget::Submission(id)))?;
    if fresh.version != expected_version {
        return Err(WorkflowError::Conflict {
            target: format!("submission {id}"),
            detail: format!(
                "expected version {expected_version}, found {}",
                fresh.version
            ),
        });
    }
    Ok(fresh)
}

fn ensure_document_present(ctx: &EngineContext, submission: &Submission) -> WorkflowResult<()> {
    let document = submission.proposal_document_ref.as_deref().ok_or_else(|| {
        WorkflowError::validation("proposal_document_ref", "no proposal document stored")
    })?;
    if !ctx.documents.exists(document)? {
        return Err(WorkflowError::validation(
            "proposal_document_ref",
            format!("stored proposal document {document} is missing"),
        ));
    }
    Ok(())
}

/// Checks who may record against `open`; returns the override reason to
/// store, if any.
fn review_override<'r>(
    actor: &Actor,
    open: &ReviewerAssignment,
    request: &'r SubmitReviewRequest,
) -> WorkflowResult<Option<&'r str>> {
    let is_assignee = actor.identity.trim() == open.reviewer_key.as_str();
    match actor.role {
        Role::Reviewer if is_assignee => Ok(None),
        Role::Reviewer => Err(WorkflowError::not_permitted(
            actor,
            "review an artifact assigned to another reviewer",
        )),
        Role::Admin if is_assignee => Ok(None),
        Role::Admin => request
            .override_reason
            .as_deref()
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .map(Some)
            .ok_or_else(|| {
                WorkflowError::validation(
                    "override_reason",
                    "required when recording a review for another reviewer",
                )
            }),
        Role::Student => Err(WorkflowError::not_permitted(actor, "submit reviews")),
    }
}

fn set_artifact(
    submission: &mut Submission,
    artifact: ArtifactKind,
    status: ReviewStatus,
    reviewer: Option<StaffKey>,
) {
    match artifact {
        ArtifactKind::Title => {
            submission.title_status = status;
            submission.title_reviewer_key = reviewer;
        }
        ArtifactKind::Proposal => {
            submission.proposal_status = Some(status);
            submission.proposal_reviewer_key = reviewer;
        }
    }
}

fn stamp(submission: &mut Submission, actor: &Actor, now: i64) {
    submission.updated_at = now;
    submission.updated_by = actor.audit_label();
}
