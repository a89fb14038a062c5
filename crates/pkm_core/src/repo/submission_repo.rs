//! Submission, team and form-answer persistence.
//!
//! # Responsibility
//! - Insert and update the submission row with an optimistic version check.
//! - Replace team membership and form answers wholesale.
//! - Hand out per-(category, year) code sequence numbers.
//!
//! # Invariants
//! - Reads go through `active_submissions` / `active_team_members`.
//! - `update_submission` only succeeds against the version it was given and
//!   bumps it by one.
//! - The code counter never hands out a value at or below a persisted
//!   `code_seq` for the same (category, year).

use super::{
    bool_to_int, parse_enum, parse_flag, parse_uuid, to_u32, RepoError, RepoResult,
};
use crate::model::identity::{StaffKey, StudentKey};
use crate::model::reference::CategoryId;
use crate::model::submission::{
    FinalStatus, FormAnswer, ReviewStatus, Submission, SubmissionId, TeamMember,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashMap;

pub const SUBMISSIONS_DEFAULT_LIMIT: u32 = 20;
pub const SUBMISSIONS_LIMIT_MAX: u32 = 100;

const SUBMISSION_COLUMNS: &str = "
    id,
    code,
    code_seq,
    category_id,
    title,
    year,
    lead_key,
    title_status,
    proposal_status,
    final_status,
    proposal_document_ref,
    title_reviewer_key,
    proposal_reviewer_key,
    title_review_note,
    proposal_review_note,
    title_reviewed_at,
    proposal_reviewed_at,
    version,
    is_deleted,
    created_at,
    updated_at,
    updated_by";

/// Filters for submission listings. All filters are conjunctive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionQuery {
    pub title_status: Option<ReviewStatus>,
    pub proposal_status: Option<ReviewStatus>,
    pub final_status: Option<FinalStatus>,
    pub category_id: Option<CategoryId>,
    pub year: Option<i32>,
    pub lead_key: Option<StudentKey>,
    pub limit: Option<u32>,
    pub offset: u32,
}

pub trait SubmissionRepository {
    /// Fails with `UniqueViolation` when the code is already taken.
    fn insert_submission(&self, submission: &Submission) -> RepoResult<()>;
    fn get_submission(&self, id: SubmissionId) -> RepoResult<Option<Submission>>;
    /// Writes every mutable column; returns the new version.
    fn update_submission(&self, submission: &Submission, expected_version: i64)
        -> RepoResult<i64>;
    fn soft_delete_submission(
        &self,
        id: SubmissionId,
        expected_version: i64,
        updated_at: i64,
        updated_by: &str,
    ) -> RepoResult<()>;
    fn list_submissions(&self, query: &SubmissionQuery) -> RepoResult<Vec<Submission>>;
    /// Row count for `query`, ignoring limit/offset.
    fn count_submissions(&self, query: &SubmissionQuery) -> RepoResult<u64>;

    fn list_team(&self, id: SubmissionId) -> RepoResult<Vec<TeamMember>>;
    /// Soft-deletes the active team and inserts `members` in its place.
    fn replace_team(&self, id: SubmissionId, members: &[TeamMember]) -> RepoResult<()>;
    fn team_sizes(&self, ids: &[SubmissionId]) -> RepoResult<HashMap<SubmissionId, u32>>;

    fn list_form_answers(&self, id: SubmissionId) -> RepoResult<Vec<FormAnswer>>;
    fn replace_form_answers(&self, id: SubmissionId, answers: &[FormAnswer]) -> RepoResult<()>;

    /// Reserves the next code sequence for (category, year).
    fn next_code_seq(&self, category_id: CategoryId, year: i32) -> RepoResult<u32>;
}

pub struct SqliteSubmissionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSubmissionRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SubmissionRepository for SqliteSubmissionRepository<'_> {
    fn insert_submission(&self, submission: &Submission) -> RepoResult<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO submissions ({SUBMISSION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                         ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22);"
            ),
            params![
                submission.id.to_string(),
                submission.code.as_str(),
                i64::from(submission.code_seq),
                submission.category_id,
                submission.title.as_str(),
                submission.year,
                submission.lead_key.as_str(),
                submission.title_status.as_str(),
                submission.proposal_status.map(ReviewStatus::as_str),
                submission.final_status.as_str(),
                submission.proposal_document_ref.as_deref(),
                submission.title_reviewer_key.as_ref().map(StaffKey::as_str),
                submission.proposal_reviewer_key.as_ref().map(StaffKey::as_str),
                submission.title_review_note.as_deref(),
                submission.proposal_review_note.as_deref(),
                submission.title_reviewed_at,
                submission.proposal_reviewed_at,
                submission.version,
                bool_to_int(submission.is_deleted),
                submission.created_at,
                submission.updated_at,
                submission.updated_by.as_str(),
            ],
        )?;
        Ok(())
    }

    fn get_submission(&self, id: SubmissionId) -> RepoResult<Option<Submission>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM active_submissions WHERE id = ?1;"
        ))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_submission_row(row)?));
        }
        Ok(None)
    }

    fn update_submission(
        &self,
        submission: &Submission,
        expected_version: i64,
    ) -> RepoResult<i64> {
        let next_version = expected_version + 1;
        let changed = self.conn.execute(
            "UPDATE submissions
             SET
                title = ?1,
                title_status = ?2,
                proposal_status = ?3,
                final_status = ?4,
                proposal_document_ref = ?5,
                title_reviewer_key = ?6,
                proposal_reviewer_key = ?7,
                title_review_note = ?8,
                proposal_review_note = ?9,
                title_reviewed_at = ?10,
                proposal_reviewed_at = ?11,
                updated_at = ?12,
                updated_by = ?13,
                version = ?14
             WHERE id = ?15
               AND version = ?16
               AND is_deleted = 0;",
            params![
                submission.title.as_str(),
                submission.title_status.as_str(),
                submission.proposal_status.map(ReviewStatus::as_str),
                submission.final_status.as_str(),
                submission.proposal_document_ref.as_deref(),
                submission.title_reviewer_key.as_ref().map(StaffKey::as_str),
                submission.proposal_reviewer_key.as_ref().map(StaffKey::as_str),
                submission.title_review_note.as_deref(),
                submission.proposal_review_note.as_deref(),
                submission.title_reviewed_at,
                submission.proposal_reviewed_at,
                submission.updated_at,
                submission.updated_by.as_str(),
                next_version,
                submission.id.to_string(),
                expected_version,
            ],
        )?;

        if changed == 0 {
            return Err(self.missing_or_stale(submission.id, expected_version)?);
        }
        Ok(next_version)
    }

    fn soft_delete_submission(
        &self,
        id: SubmissionId,
        expected_version: i64,
        updated_at: i64,
        updated_by: &str,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE submissions
             SET is_deleted = 1, updated_at = ?1, updated_by = ?2, version = version + 1
             WHERE id = ?3 AND version = ?4 AND is_deleted = 0;",
            params![updated_at, updated_by, id.to_string(), expected_version],
        )?;
        if changed == 0 {
            return Err(self.missing_or_stale(id, expected_version)?);
        }
        self.conn.execute(
            "UPDATE team_members SET is_deleted = 1
             WHERE submission_id = ?1 AND is_deleted = 0;",
            [id.to_string()],
        )?;
        Ok(())
    }

    fn list_submissions(&self, query: &SubmissionQuery) -> RepoResult<Vec<Submission>> {
        let (filter, mut bind_values) = build_filter(query);
        let mut sql = format!(
            "SELECT {SUBMISSION_COLUMNS} FROM active_submissions{filter}
             ORDER BY year DESC, category_id ASC, code_seq ASC"
        );
        sql.push_str(" LIMIT ?");
        bind_values.push(Value::Integer(i64::from(normalize_submission_limit(
            query.limit,
        ))));
        if query.offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_submission_row(row)?);
        }
        Ok(items)
    }

    fn count_submissions(&self, query: &SubmissionQuery) -> RepoResult<u64> {
        let (filter, bind_values) = build_filter(query);
        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM active_submissions{filter};"),
            params_from_iter(bind_values),
            |row| row.get(0),
        )?;
        u64::try_from(total)
            .map_err(|_| RepoError::InvalidData(format!("negative submission count {total}")))
    }

    fn list_team(&self, id: SubmissionId) -> RepoResult<Vec<TeamMember>> {
        let mut stmt = self.conn.prepare(
            "SELECT member_key, is_lead, display_order
             FROM active_team_members
             WHERE submission_id = ?1
             ORDER BY display_order ASC, id ASC;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        let mut members = Vec::new();
        while let Some(row) = rows.next()? {
            members.push(TeamMember {
                member_key: StudentKey::new(row.get::<_, String>("member_key")?),
                is_lead: parse_flag(row.get("is_lead")?, "team_members.is_lead")?,
                display_order: to_u32(
                    row.get("display_order")?,
                    "team_members.display_order",
                )?,
            });
        }
        Ok(members)
    }

    fn replace_team(&self, id: SubmissionId, members: &[TeamMember]) -> RepoResult<()> {
        let id_text = id.to_string();
        self.conn.execute(
            "UPDATE team_members SET is_deleted = 1
             WHERE submission_id = ?1 AND is_deleted = 0;",
            [id_text.as_str()],
        )?;
        let mut insert = self.conn.prepare(
            "INSERT INTO team_members (submission_id, member_key, is_lead, display_order)
             VALUES (?1, ?2, ?3, ?4);",
        )?;
        for member in members {
            insert.execute(params![
                id_text.as_str(),
                member.member_key.as_str(),
                bool_to_int(member.is_lead),
                i64::from(member.display_order),
            ])?;
        }
        Ok(())
    }

    fn team_sizes(&self, ids: &[SubmissionId]) -> RepoResult<HashMap<SubmissionId, u32>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT submission_id, COUNT(*) AS members
             FROM active_team_members
             WHERE submission_id IN ({placeholders})
             GROUP BY submission_id;"
        ))?;
        let mut rows = stmt.query(params_from_iter(ids.iter().map(ToString::to_string)))?;
        let mut sizes = HashMap::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get("submission_id")?;
            sizes.insert(
                parse_uuid(&id_text, "team_members.submission_id")?,
                to_u32(row.get("members")?, "team_members.count")?,
            );
        }
        Ok(sizes)
    }

    fn list_form_answers(&self, id: SubmissionId) -> RepoResult<Vec<FormAnswer>> {
        let mut stmt = self.conn.prepare(
            "SELECT field_key, value FROM form_answers
             WHERE submission_id = ?1
             ORDER BY field_key ASC;",
        )?;
        let answers = stmt
            .query_map([id.to_string()], |row| {
                Ok(FormAnswer::new(
                    row.get::<_, String>("field_key")?,
                    row.get::<_, String>("value")?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(answers)
    }

    fn replace_form_answers(&self, id: SubmissionId, answers: &[FormAnswer]) -> RepoResult<()> {
        let id_text = id.to_string();
        self.conn
            .execute("DELETE FROM form_answers WHERE submission_id = ?1;", [id_text.as_str()])?;
        let mut insert = self.conn.prepare(
            "INSERT INTO form_answers (submission_id, field_key, value) VALUES (?1, ?2, ?3);",
        )?;
        for answer in answers {
            insert.execute(params![id_text.as_str(), answer.field_key, answer.value])?;
        }
        Ok(())
    }

    fn next_code_seq(&self, category_id: CategoryId, year: i32) -> RepoResult<u32> {
        let seq: i64 = self.conn.query_row(
            "INSERT INTO submission_code_counters (category_id, year, last_seq)
             VALUES (
                ?1,
                ?2,
                COALESCE(
                    (SELECT MAX(code_seq) FROM submissions WHERE category_id = ?1 AND year = ?2),
                    0
                ) + 1
             )
             ON CONFLICT (category_id, year) DO UPDATE SET last_seq = last_seq + 1
             RETURNING last_seq;",
            params![category_id, year],
            |row| row.get(0),
        )?;
        to_u32(seq, "submission_code_counters.last_seq")
    }
}

impl SqliteSubmissionRepository<'_> {
    /// Explains a zero-row update: the row is gone, or its version moved.
    fn missing_or_stale(&self, id: SubmissionId, expected: i64) -> RepoResult<RepoError> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM active_submissions WHERE id = ?1;",
                [id.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(match exists {
            Some(()) => RepoError::StaleVersion { id, expected },
            None => RepoError::not_found("submission", id),
        })
    }
}

/// Resolves the page size: `None`/`0` use the default, larger values clamp.
pub fn normalize_submission_limit(limit: Option<u32>) -> u32 {
    match limit {
        None | Some(0) => SUBMISSIONS_DEFAULT_LIMIT,
        Some(value) if value > SUBMISSIONS_LIMIT_MAX => SUBMISSIONS_LIMIT_MAX,
        Some(value) => value,
    }
}

fn build_filter(query: &SubmissionQuery) -> (String, Vec<Value>) {
    let mut clauses: Vec<&str> = Vec::new();
    let mut bind_values = Vec::new();

    if let Some(status) = query.title_status {
        clauses.push("title_status = ?");
        bind_values.push(Value::Text(status.as_str().to_string()));
    }
    if let Some(status) = query.proposal_status {
        clauses.push("proposal_status = ?");
        bind_values.push(Value::Text(status.as_str().to_string()));
    }
    if let Some(status) = query.final_status {
        clauses.push("final_status = ?");
        bind_values.push(Value::Text(status.as_str().to_string()));
    }
    if let Some(category_id) = query.category_id {
        clauses.push("category_id = ?");
        bind_values.push(Value::Integer(category_id));
    }
    if let Some(year) = query.year {
        clauses.push("year = ?");
        bind_values.push(Value::Integer(i64::from(year)));
    }
    if let Some(lead_key) = &query.lead_key {
        clauses.push("lead_key = ?");
        bind_values.push(Value::Text(lead_key.as_str().to_string()));
    }

    if clauses.is_empty() {
        (String::new(), bind_values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), bind_values)
    }
}

fn parse_submission_row(row: &Row<'_>) -> RepoResult<Submission> {
    let id_text: String = row.get("id")?;
    let title_status: String = row.get("title_status")?;
    let final_status: String = row.get("final_status")?;
    let proposal_status = match row.get::<_, Option<String>>("proposal_status")? {
        Some(value) => Some(parse_enum(
            &value,
            "submissions.proposal_status",
            ReviewStatus::parse,
        )?),
        None => None,
    };

    Ok(Submission {
        id: parse_uuid(&id_text, "submissions.id")?,
        code: row.get("code")?,
        code_seq: to_u32(row.get("code_seq")?, "submissions.code_seq")?,
        category_id: row.get("category_id")?,
        title: row.get("title")?,
        year: row.get("year")?,
        lead_key: StudentKey::new(row.get::<_, String>("lead_key")?),
        title_status: parse_enum(&title_status, "submissions.title_status", ReviewStatus::parse)?,
        proposal_status,
        final_status: parse_enum(&final_status, "submissions.final_status", FinalStatus::parse)?,
        proposal_document_ref: row.get("proposal_document_ref")?,
        title_reviewer_key: row
            .get::<_, Option<String>>("title_reviewer_key")?
            .map(StaffKey::new),
        proposal_reviewer_key: row
            .get::<_, Option<String>>("proposal_reviewer_key")?
            .map(StaffKey::new),
        title_review_note: row.get("title_review_note")?,
        proposal_review_note: row.get("proposal_review_note")?,
        title_reviewed_at: row.get("title_reviewed_at")?,
        proposal_reviewed_at: row.get("proposal_reviewed_at")?,
        version: row.get("version")?,
        is_deleted: parse_flag(row.get("is_deleted")?, "submissions.is_deleted")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        updated_by: row.get("updated_by")?,
    })
}
