//! Read models returned to callers, enriched best-effort with external
//! identity records.
//!
//! Assembly never fails on an identity miss or provider outage; the
//! affected fields are `None` and the failing providers are listed in
//! `degraded`.

use super::error::{NotFoundTarget, WorkflowError, WorkflowResult};
use super::EngineContext;
use crate::identity::{Enrichment, ResolvedStaff, ResolvedStudent};
use crate::model::identity::{StaffKey, StudentKey};
use crate::model::reference::Category;
use crate::model::submission::{
    FormAnswer, ReviewRecord, ReviewStatus, ReviewerAssignment, Submission, SubmissionId,
    TeamMember,
};
use crate::repo::reference_repo::{ReferenceRepository, SqliteReferenceRepository};
use crate::repo::review_repo::{ReviewRepository, SqliteReviewRepository};
use crate::repo::submission_repo::{SqliteSubmissionRepository, SubmissionRepository};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberView {
    #[serde(flatten)]
    pub member: TeamMember,
    pub student: Option<ResolvedStudent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffView {
    pub key: StaffKey,
    pub staff: Option<ResolvedStaff>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewView {
    #[serde(flatten)]
    pub record: ReviewRecord,
    pub reviewer: Option<ResolvedStaff>,
}

/// Full reassembled state of one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionDetail {
    pub submission: Submission,
    pub category: Option<Category>,
    /// Ordered by display order; the lead is first.
    pub team: Vec<MemberView>,
    pub form_answers: Vec<FormAnswer>,
    pub title_reviewer: Option<StaffView>,
    pub proposal_reviewer: Option<StaffView>,
    /// Oldest first.
    pub reviews: Vec<ReviewView>,
    pub assignments: Vec<ReviewerAssignment>,
    /// Providers that failed while this view was assembled.
    pub degraded: Vec<&'static str>,
}

impl SubmissionDetail {
    pub fn lead(&self) -> Option<&MemberView> {
        self.team.iter().find(|view| view.member.is_lead)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionSummary {
    pub submission: Submission,
    pub lead: Option<ResolvedStudent>,
    pub member_count: u32,
    pub proposal_reviewer: Option<StaffView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionPage {
    pub items: Vec<SubmissionSummary>,
    /// Matching rows before limit/offset.
    pub total: u64,
    pub applied_limit: u32,
}

/// One row of a reviewer's worklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewerWorkItem {
    pub assignment: ReviewerAssignment,
    pub code: String,
    pub title: String,
    /// Current status of the assigned artifact.
    pub status: Option<ReviewStatus>,
    pub lead: Option<ResolvedStudent>,
}

/// Re-reads a submission and everything it owns, then enriches it.
///
/// All local reads happen before any provider call.
pub(crate) fn load_detail(
    conn: &Connection,
    ctx: &EngineContext,
    id: SubmissionId,
) -> WorkflowResult<SubmissionDetail> {
    let submissions = SqliteSubmissionRepository::new(conn);
    let reviews = SqliteReviewRepository::new(conn);
    let submission = submissions
        .get_submission(id)?
        .ok_or(WorkflowError::NotFound(NotFoundTarget::Submission(id)))?;
    let category = SqliteReferenceRepository::new(conn).get_category(submission.category_id)?;
    let team = submissions.list_team(id)?;
    let form_answers = submissions.list_form_answers(id)?;
    let records = reviews.list_review_records(id)?;
    let assignments = reviews.list_assignments(id)?;

    let student_keys: Vec<StudentKey> =
        team.iter().map(|member| member.member_key.clone()).collect();
    let staff_keys: Vec<StaffKey> = submission
        .title_reviewer_key
        .iter()
        .chain(submission.proposal_reviewer_key.iter())
        .chain(records.iter().map(|record| &record.reviewer_key))
        .cloned()
        .collect();
    let enrichment = ctx.identity.enrich(&student_keys, &staff_keys);

    let team = team
        .into_iter()
        .map(|member| MemberView {
            student: enrichment.students.get(&member.member_key).cloned(),
            member,
        })
        .collect();
    let reviews = records
        .into_iter()
        .map(|record| ReviewView {
            reviewer: enrichment.staff.get(&record.reviewer_key).cloned(),
            record,
        })
        .collect();

    Ok(SubmissionDetail {
        title_reviewer: staff_view(submission.title_reviewer_key.as_ref(), &enrichment),
        proposal_reviewer: staff_view(submission.proposal_reviewer_key.as_ref(), &enrichment),
        degraded: degraded_providers(&enrichment),
        submission,
        category,
        team,
        form_answers,
        reviews,
        assignments,
    })
}

/// Enriches one page of submissions with a single call per provider.
pub(crate) fn summarize(
    ctx: &EngineContext,
    submissions: Vec<Submission>,
    team_sizes: &HashMap<SubmissionId, u32>,
) -> Vec<SubmissionSummary> {
    let leads: Vec<StudentKey> = submissions.iter().map(|s| s.lead_key.clone()).collect();
    let reviewers: Vec<StaffKey> = submissions
        .iter()
        .filter_map(|s| s.proposal_reviewer_key.clone())
        .collect();
    let enrichment = ctx.identity.enrich(&leads, &reviewers);

    submissions
        .into_iter()
        .map(|submission| SubmissionSummary {
            lead: enrichment.students.get(&submission.lead_key).cloned(),
            member_count: team_sizes.get(&submission.id).copied().unwrap_or(0),
            proposal_reviewer: staff_view(submission.proposal_reviewer_key.as_ref(), &enrichment),
            submission,
        })
        .collect()
}

pub(crate) fn work_items(
    ctx: &EngineContext,
    rows: Vec<(ReviewerAssignment, Submission)>,
) -> Vec<ReviewerWorkItem> {
    let leads: Vec<StudentKey> = rows.iter().map(|(_, s)| s.lead_key.clone()).collect();
    let enrichment = ctx.identity.enrich(&leads, &[]);
    rows.into_iter()
        .map(|(assignment, submission)| ReviewerWorkItem {
            status: submission.status_of(assignment.artifact),
            lead: enrichment.students.get(&submission.lead_key).cloned(),
            code: submission.code,
            title: submission.title,
            assignment,
        })
        .collect()
}

fn staff_view(key: Option<&StaffKey>, enrichment: &Enrichment) -> Option<StaffView> {
    key.map(|key| StaffView {
        key: key.clone(),
        staff: enrichment.staff.get(key).cloned(),
    })
}

fn degraded_providers(enrichment: &Enrichment) -> Vec<&'static str> {
    let mut providers: Vec<&'static str> = enrichment
        .degraded
        .iter()
        .map(|failure| failure.provider.as_str())
        .collect();
    providers.sort_unstable();
    providers.dedup();
    providers
}
