//! Submission lifecycle use-cases.
//!
//! # Responsibility
//! - Create submissions with their team, form answers and generated code.
//! - Let the lead revise the title and upload or revise the proposal.
//! - Serve detail and list views, soft delete, and the final announcement.
//!
//! # Invariants
//! - A submission is never persisted without its lead team member.
//! - A stored proposal document is removed again whenever the status update
//!   that references it does not commit.
//! - After a successful proposal revision exactly one document is stored.

use super::code_generator::insert_with_code;
use super::error::{FieldError, NotFoundTarget, WorkflowError, WorkflowResult};
use super::team::{normalize_team, validate_team, MemberInput};
use super::views::{load_detail, summarize, SubmissionDetail, SubmissionPage};
use super::{observed, EngineContext};
use crate::identity::{Resolution, StrictLookupError};
use crate::model::actor::{Actor, Role};
use crate::model::identity::StudentKey;
use crate::model::reference::{CategoryId, WindowState};
use crate::model::submission::{
    ArtifactKind, AssignmentState, DocumentRef, FinalStatus, FormAnswer, ReviewStatus,
    Submission, SubmissionId, TeamMember,
};
use crate::repo::reference_repo::{ReferenceRepository, SqliteReferenceRepository};
use crate::repo::review_repo::{ReviewRepository, SqliteReviewRepository};
use crate::repo::submission_repo::{
    normalize_submission_limit, SqliteSubmissionRepository, SubmissionQuery, SubmissionRepository,
};
use crate::workflow::{announce_final, next_status, require_status, ReviewTrigger};
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSubmissionRequest {
    pub category_id: CategoryId,
    pub title: String,
    pub lead_key: StudentKey,
    /// Other members; the lead is added when missing.
    #[serde(default)]
    pub members: Vec<MemberInput>,
    #[serde(default)]
    pub form_answers: Vec<FormAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseTitleRequest {
    pub submission_id: SubmissionId,
    pub title: String,
    /// Replaces the whole team when present.
    #[serde(default)]
    pub members: Option<Vec<MemberInput>>,
    /// Replaces every form answer when present.
    #[serde(default)]
    pub form_answers: Option<Vec<FormAnswer>>,
}

/// Uploaded proposal file as received from the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ProposalDocument {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Submission use-case service bound to one connection.
pub struct SubmissionService<'a> {
    conn: &'a mut Connection,
    ctx: &'a EngineContext,
}

impl<'a> SubmissionService<'a> {
    pub fn new(conn: &'a mut Connection, ctx: &'a EngineContext) -> Self {
        Self { conn, ctx }
    }

    /// Creates a submission in `pending/draft` state.
    ///
    /// # Contract
    /// - Non-admin callers must be the lead and need an open registration
    ///   window; every member must resolve in student records.
    /// - Administrators bypass the window and only get a logged warning for
    ///   members that do not resolve.
    /// - Submission, team and form answers are written in one transaction.
    pub fn create_submission(
        &mut self,
        actor: &Actor,
        request: CreateSubmissionRequest,
    ) -> WorkflowResult<SubmissionDetail> {
        let lead = request.lead_key.clone();
        observed("submission_create", actor, &lead, || {
            self.create_submission_inner(actor, request)
        })
    }

    fn create_submission_inner(
        &mut self,
        actor: &Actor,
        request: CreateSubmissionRequest,
    ) -> WorkflowResult<SubmissionDetail> {
        let ctx = self.ctx;
        let config = &ctx.config;
        let title = normalize_title(&request.title, config.title_min_chars, config.title_max_chars)?;
        if !actor.is_admin()
            && (actor.role != Role::Student || actor.identity.trim() != request.lead_key.as_str())
        {
            return Err(WorkflowError::not_permitted(
                actor,
                "create a submission led by someone else",
            ));
        }

        let now = ctx.clock.now_epoch_ms();
        let reference = SqliteReferenceRepository::new(self.conn);
        if !actor.is_admin() {
            let state = reference
                .active_window()?
                .map_or(WindowState::NoActiveWindow, |window| window.state_at(now));
            if !state.is_open() {
                return Err(WorkflowError::RegistrationClosed(state));
            }
        }
        let category = reference
            .get_category(request.category_id)?
            .ok_or(WorkflowError::NotFound(NotFoundTarget::Category(
                request.category_id,
            )))?;
        if !category.is_active {
            return Err(WorkflowError::validation(
                "category_id",
                format!("category {} is not accepting submissions", category.name),
            ));
        }

        let team = normalize_team(&request.lead_key, &request.members);
        validate_team(&team, config.max_team_size)?;
        let answers = normalize_form_answers(&request.form_answers)?;
        resolve_team(ctx, actor, &team)?;

        let mut submission = Submission {
            id: Uuid::new_v4(),
            code: String::new(),
            code_seq: 0,
            category_id: category.id,
            title,
            year: ctx.clock.current_year(),
            lead_key: request.lead_key,
            title_status: ReviewStatus::Pending,
            proposal_status: None,
            final_status: FinalStatus::Draft,
            proposal_document_ref: None,
            title_reviewer_key: None,
            proposal_reviewer_key: None,
            title_review_note: None,
            proposal_review_note: None,
            title_reviewed_at: None,
            proposal_reviewed_at: None,
            version: 1,
            is_deleted: false,
            created_at: now,
            updated_at: now,
            updated_by: actor.audit_label(),
        };

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let repo = SqliteSubmissionRepository::new(&tx);
            insert_with_code(
                &repo,
                &mut submission,
                &config.code_prefix,
                &category.short_code(&config.code_prefix),
                config.code_retry_limit,
            )?;
            repo.replace_team(submission.id, &team)?;
            repo.replace_form_answers(submission.id, &answers)?;
        }
        tx.commit()?;

        log::info!(
            "event=submission_created module=service status=ok id={} code={} members={}",
            submission.id,
            submission.code,
            team.len()
        );
        load_detail(self.conn, ctx, submission.id)
    }

    /// Lead revises a title that came back as `needs_revision`.
    ///
    /// # Contract
    /// - Title status returns to `pending`.
    /// - `members` / `form_answers`, when present, replace the stored sets in
    ///   the same transaction.
    pub fn revise_title(
        &mut self,
        actor: &Actor,
        request: ReviseTitleRequest,
    ) -> WorkflowResult<SubmissionDetail> {
        let id = request.submission_id;
        observed("title_revise", actor, &id, || self.revise_title_inner(actor, request))
    }

    fn revise_title_inner(
        &mut self,
        actor: &Actor,
        request: ReviseTitleRequest,
    ) -> WorkflowResult<SubmissionDetail> {
        let ctx = self.ctx;
        let config = &ctx.config;
        let title = normalize_title(&request.title, config.title_min_chars, config.title_max_chars)?;
        let current = self.load_submission(request.submission_id)?;
        ensure_lead(actor, &current)?;
        let next = next_status(
            ArtifactKind::Title,
            Some(current.title_status),
            ReviewTrigger::Revise,
        )?;

        let team = match &request.members {
            Some(members) => {
                let team = normalize_team(&current.lead_key, members);
                validate_team(&team, config.max_team_size)?;
                resolve_team(ctx, actor, &team)?;
                Some(team)
            }
            None => None,
        };
        let answers = request
            .form_answers
            .as_deref()
            .map(normalize_form_answers)
            .transpose()?;

        let mut updated = current.clone();
        updated.title = title;
        updated.title_status = next;
        self.stamp(&mut updated, actor);

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let repo = SqliteSubmissionRepository::new(&tx);
            repo.update_submission(&updated, current.version)?;
            if let Some(team) = &team {
                repo.replace_team(updated.id, team)?;
            }
            if let Some(answers) = &answers {
                repo.replace_form_answers(updated.id, answers)?;
            }
        }
        tx.commit()?;
        load_detail(self.conn, ctx, updated.id)
    }

    /// First proposal upload; requires an accepted title.
    pub fn upload_proposal(
        &mut self,
        actor: &Actor,
        id: SubmissionId,
        document: &ProposalDocument,
    ) -> WorkflowResult<SubmissionDetail> {
        observed("proposal_upload", actor, &id, || {
            let current = self.load_submission(id)?;
            ensure_lead(actor, &current)?;
            require_status(
                ArtifactKind::Title,
                Some(current.title_status),
                ReviewStatus::Accepted,
                "proposal upload",
            )?;
            let next = next_status(
                ArtifactKind::Proposal,
                current.proposal_status,
                ReviewTrigger::Submit,
            )?;
            self.replace_document(actor, &current, next, document)?;
            load_detail(self.conn, self.ctx, id)
        })
    }

    /// Replaces a proposal that came back as `needs_revision`.
    ///
    /// # Contract
    /// - The new document is stored first; the previous one is deleted only
    ///   after the status update commits.
    pub fn revise_proposal(
        &mut self,
        actor: &Actor,
        id: SubmissionId,
        document: &ProposalDocument,
    ) -> WorkflowResult<SubmissionDetail> {
        observed("proposal_revise", actor, &id, || {
            let current = self.load_submission(id)?;
            ensure_lead(actor, &current)?;
            let next = next_status(
                ArtifactKind::Proposal,
                current.proposal_status,
                ReviewTrigger::Revise,
            )?;
            self.replace_document(actor, &current, next, document)?;
            load_detail(self.conn, self.ctx, id)
        })
    }

    /// Reassembles one submission. External misses degrade to `None`.
    pub fn get_detail(&self, id: SubmissionId) -> WorkflowResult<SubmissionDetail> {
        load_detail(self.conn, self.ctx, id)
    }

    /// Administrative listing with filters and pagination.
    pub fn list_submissions(
        &self,
        actor: &Actor,
        query: &SubmissionQuery,
    ) -> WorkflowResult<SubmissionPage> {
        if !actor.is_admin() {
            return Err(WorkflowError::not_permitted(actor, "list all submissions"));
        }
        self.page(query)
    }

    /// Submissions led by the calling student.
    pub fn list_my_submissions(
        &self,
        actor: &Actor,
        query: &SubmissionQuery,
    ) -> WorkflowResult<SubmissionPage> {
        if actor.role != Role::Student {
            return Err(WorkflowError::not_permitted(actor, "list own submissions"));
        }
        let mut query = query.clone();
        query.lead_key = Some(StudentKey::new(&actor.identity));
        self.page(&query)
    }

    /// Soft-deletes a submission, its team and any open assignment.
    pub fn delete_submission(&mut self, actor: &Actor, id: SubmissionId) -> WorkflowResult<()> {
        observed("submission_delete", actor, &id, || {
            if !actor.is_admin() {
                return Err(WorkflowError::not_permitted(actor, "delete submissions"));
            }
            let current = self.load_submission(id)?;
            let now = self.ctx.clock.now_epoch_ms();

            let tx = self
                .conn
                .transaction_with_behavior(TransactionBehavior::Immediate)?;
            {
                let submissions = SqliteSubmissionRepository::new(&tx);
                let reviews = SqliteReviewRepository::new(&tx);
                submissions.soft_delete_submission(id, current.version, now, &actor.audit_label())?;
                for artifact in ArtifactKind::ALL {
                    if let Some(open) = reviews.active_assignment(id, artifact)? {
                        reviews.close_assignment(open.id, AssignmentState::Cancelled, now)?;
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Announces `passed` or `failed`. One-way.
    pub fn announce_final_result(
        &mut self,
        actor: &Actor,
        id: SubmissionId,
        result: FinalStatus,
    ) -> WorkflowResult<SubmissionDetail> {
        observed("final_announce", actor, &id, || {
            if !actor.is_admin() {
                return Err(WorkflowError::not_permitted(actor, "announce final results"));
            }
            let current = self.load_submission(id)?;
            let final_status = announce_final(
                current.final_status,
                result,
                current.title_status,
                current.proposal_status,
            )?;

            let mut updated = current.clone();
            updated.final_status = final_status;
            self.stamp(&mut updated, actor);

            let tx = self
                .conn
                .transaction_with_behavior(TransactionBehavior::Immediate)?;
            SqliteSubmissionRepository::new(&tx).update_submission(&updated, current.version)?;
            tx.commit()?;
            load_detail(self.conn, self.ctx, id)
        })
    }

    fn page(&self, query: &SubmissionQuery) -> WorkflowResult<SubmissionPage> {
        let repo = SqliteSubmissionRepository::new(self.conn);
        let applied_limit = normalize_submission_limit(query.limit);
        let total = repo.count_submissions(query)?;
        let items = repo.list_submissions(query)?;
        let ids: Vec<SubmissionId> = items.iter().map(|item| item.id).collect();
        let sizes = repo.team_sizes(&ids)?;
        Ok(SubmissionPage {
            items: summarize(self.ctx, items, &sizes),
            total,
            applied_limit,
        })
    }

    fn load_submission(&self, id: SubmissionId) -> WorkflowResult<Submission> {
        SqliteSubmissionRepository::new(self.conn)
            .get_submission(id)?
            .ok_or(WorkflowError::NotFound(NotFoundTarget::Submission(id)))
    }

    fn stamp(&self, submission: &mut Submission, actor: &Actor) {
        submission.updated_at = self.ctx.clock.now_epoch_ms();
        submission.updated_by = actor.audit_label();
    }

    /// Stores `document`, points the submission at it and sets the proposal
    /// status, cleaning up whichever blob lost.
    fn replace_document(
        &mut self,
        actor: &Actor,
        current: &Submission,
        next: ReviewStatus,
        document: &ProposalDocument,
    ) -> WorkflowResult<()> {
        let ctx = self.ctx;
        let documents = &ctx.documents;
        let hint = match document.file_name.rsplit_once('.') {
            Some((_, ext)) => format!("proposal_{}.{ext}", current.code),
            None => format!("proposal_{}", current.code),
        };
        let stored: DocumentRef = documents.store(&document.bytes, &hint)?;

        let mut updated = current.clone();
        updated.proposal_document_ref = Some(stored.clone());
        updated.proposal_status = Some(next);
        self.stamp(&mut updated, actor);

        let committed = (|| -> WorkflowResult<()> {
            let tx = self
                .conn
                .transaction_with_behavior(TransactionBehavior::Immediate)?;
            SqliteSubmissionRepository::new(&tx).update_submission(&updated, current.version)?;
            tx.commit()?;
            Ok(())
        })();

        let (orphan, kind) = match &committed {
            Ok(()) => (current.proposal_document_ref.as_deref(), "previous"),
            Err(_) => (Some(stored.as_str()), "rejected"),
        };
        if let Some(orphan) = orphan {
            if let Err(err) = documents.delete(orphan) {
                log::warn!(
                    "event=document_cleanup module=service status=error id={} document={orphan} which={kind} error={err}",
                    current.id
                );
            }
        }
        committed
    }
}

fn ensure_lead(actor: &Actor, submission: &Submission) -> WorkflowResult<()> {
    if actor.role == Role::Student && submission.is_lead(&actor.identity) {
        return Ok(());
    }
    Err(WorkflowError::not_permitted(
        actor,
        "change a submission they do not lead",
    ))
}

/// Strict for students, best-effort for administrators.
fn resolve_team(ctx: &EngineContext, actor: &Actor, team: &[TeamMember]) -> WorkflowResult<()> {
    let keys: Vec<StudentKey> = team.iter().map(|member| member.member_key.clone()).collect();
    if actor.is_admin() {
        let lookup = ctx.identity.lookup_students(&keys);
        let missing = keys
            .iter()
            .filter(|key| matches!(lookup.resolution(key), Resolution::NotFound))
            .count();
        if lookup.failure().is_some() || missing > 0 {
            log::warn!(
                "event=member_resolve module=service status=degraded actor={actor} missing={missing} provider_failed={}",
                lookup.failure().is_some()
            );
        }
        return Ok(());
    }

    let records = match ctx.identity.require_students(&keys) {
        Ok(records) => records,
        Err(StrictLookupError::Missing(missing)) => {
            return Err(WorkflowError::UnresolvedMember(missing))
        }
        Err(StrictLookupError::Unavailable(err)) => {
            return Err(WorkflowError::DependencyUnavailable(err))
        }
    };
    for (index, key) in keys.iter().enumerate() {
        if records.get(key).is_some_and(|record| !record.is_active) {
            return Err(WorkflowError::Validation(FieldError::new(
                format!("members[{index}].key"),
                format!("student {key} is not active"),
            )));
        }
    }
    Ok(())
}

fn normalize_title(raw: &str, min_chars: usize, max_chars: usize) -> WorkflowResult<String> {
    let title = raw.trim();
    let chars = title.chars().count();
    if chars < min_chars || chars > max_chars {
        return Err(WorkflowError::validation(
            "title",
            format!("must be {min_chars}..={max_chars} characters, got {chars}"),
        ));
    }
    Ok(title.to_string())
}

fn normalize_form_answers(answers: &[FormAnswer]) -> WorkflowResult<Vec<FormAnswer>> {
    let mut seen = HashSet::with_capacity(answers.len());
    let mut normalized = Vec::with_capacity(answers.len());
    for (index, answer) in answers.iter().enumerate() {
        let key = answer.field_key.trim();
        if key.is_empty() {
            return Err(WorkflowError::validation(
                format!("form_answers[{index}].field_key"),
                "field key is required",
            ));
        }
        if !seen.insert(key.to_string()) {
            return Err(WorkflowError::validation(
                format!("form_answers[{index}].field_key"),
                format!("`{key}` is answered more than once"),
            ));
        }
        normalized.push(FormAnswer::new(key, answer.value.trim()));
    }
    Ok(normalized)
}
