//! Reviewer assignments and the append-only review history.
//!
//! # Invariants
//! - At most one `assigned` row per (submission, artifact); the partial
//!   unique index turns a second one into `UniqueViolation`.
//! - Assignments only leave `assigned`; closed rows are never reopened.
//! - Review records are insert-only; the schema aborts UPDATE and DELETE.

use super::{parse_enum, parse_uuid, RepoError, RepoResult};
use crate::model::identity::StaffKey;
use crate::model::submission::{
    ArtifactKind, AssignmentId, AssignmentState, ReviewRecord, ReviewStatus, ReviewerAssignment,
    SubmissionId,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const ASSIGNMENT_COLUMNS: &str =
    "id, submission_id, artifact, reviewer_key, state, assigned_at, assigned_by, closed_at";

const RECORD_COLUMNS: &str = "id, submission_id, artifact, assignment_id, reviewer_key, outcome, \
     note, reviewed_at, recorded_by, override_reason";

/// Input for one review record; ids and persistence are the repository's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReviewRecord<'a> {
    pub submission_id: SubmissionId,
    pub artifact: ArtifactKind,
    pub assignment_id: AssignmentId,
    pub reviewer_key: &'a StaffKey,
    pub outcome: ReviewStatus,
    pub note: &'a str,
    pub reviewed_at: i64,
    pub recorded_by: &'a str,
    pub override_reason: Option<&'a str>,
}

pub trait ReviewRepository {
    fn active_assignment(
        &self,
        submission_id: SubmissionId,
        artifact: ArtifactKind,
    ) -> RepoResult<Option<ReviewerAssignment>>;
    fn insert_assignment(
        &self,
        submission_id: SubmissionId,
        artifact: ArtifactKind,
        reviewer_key: &StaffKey,
        assigned_at: i64,
        assigned_by: &str,
    ) -> RepoResult<ReviewerAssignment>;
    /// Moves an `assigned` row to a closed state.
    fn close_assignment(
        &self,
        id: AssignmentId,
        state: AssignmentState,
        closed_at: i64,
    ) -> RepoResult<()>;
    fn list_assignments(&self, submission_id: SubmissionId) -> RepoResult<Vec<ReviewerAssignment>>;
    /// Open and reviewed assignments of one reviewer on live submissions.
    fn list_assignments_for_reviewer(
        &self,
        reviewer_key: &StaffKey,
        artifact: Option<ArtifactKind>,
    ) -> RepoResult<Vec<ReviewerAssignment>>;
    fn has_review_for_assignment(&self, id: AssignmentId) -> RepoResult<bool>;

    fn insert_review_record(&self, record: &NewReviewRecord<'_>) -> RepoResult<ReviewRecord>;
    /// Full history, oldest first.
    fn list_review_records(&self, submission_id: SubmissionId) -> RepoResult<Vec<ReviewRecord>>;
}

pub struct SqliteReviewRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteReviewRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ReviewRepository for SqliteReviewRepository<'_> {
    fn active_assignment(
        &self,
        submission_id: SubmissionId,
        artifact: ArtifactKind,
    ) -> RepoResult<Option<ReviewerAssignment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM reviewer_assignments
             WHERE submission_id = ?1 AND artifact = ?2 AND state = 'assigned';"
        ))?;
        let mut rows = stmt.query(params![submission_id.to_string(), artifact.as_str()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_assignment_row(row)?));
        }
        Ok(None)
    }

    fn insert_assignment(
        &self,
        submission_id: SubmissionId,
        artifact: ArtifactKind,
        reviewer_key: &StaffKey,
        assigned_at: i64,
        assigned_by: &str,
    ) -> RepoResult<ReviewerAssignment> {
        self.conn.execute(
            "INSERT INTO reviewer_assignments
                (submission_id, artifact, reviewer_key, state, assigned_at, assigned_by)
             VALUES (?1, ?2, ?3, 'assigned', ?4, ?5);",
            params![
                submission_id.to_string(),
                artifact.as_str(),
                reviewer_key.as_str(),
                assigned_at,
                assigned_by,
            ],
        )?;
        Ok(ReviewerAssignment {
            id: self.conn.last_insert_rowid(),
            submission_id,
            artifact,
            reviewer_key: reviewer_key.clone(),
            state: AssignmentState::Assigned,
            assigned_at,
            assigned_by: assigned_by.to_string(),
            closed_at: None,
        })
    }

    fn close_assignment(
        &self,
        id: AssignmentId,
        state: AssignmentState,
        closed_at: i64,
    ) -> RepoResult<()> {
        if state == AssignmentState::Assigned {
            return Err(RepoError::InvalidData(
                "assignment cannot be closed into `assigned`".to_string(),
            ));
        }
        let changed = self.conn.execute(
            "UPDATE reviewer_assignments
             SET state = ?1, closed_at = ?2
             WHERE id = ?3 AND state = 'assigned';",
            params![state.as_str(), closed_at, id],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("open assignment", id));
        }
        Ok(())
    }

    fn list_assignments(&self, submission_id: SubmissionId) -> RepoResult<Vec<ReviewerAssignment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM reviewer_assignments
             WHERE submission_id = ?1
             ORDER BY assigned_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([submission_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_assignment_row(row)?);
        }
        Ok(items)
    }

    fn list_assignments_for_reviewer(
        &self,
        reviewer_key: &StaffKey,
        artifact: Option<ArtifactKind>,
    ) -> RepoResult<Vec<ReviewerAssignment>> {
        let mut sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM reviewer_assignments
             WHERE reviewer_key = ?
               AND state IN ('assigned', 'reviewed')
               AND submission_id IN (SELECT id FROM active_submissions)"
        );
        let mut bind_values = vec![Value::Text(reviewer_key.as_str().to_string())];
        if let Some(artifact) = artifact {
            sql.push_str(" AND artifact = ?");
            bind_values.push(Value::Text(artifact.as_str().to_string()));
        }
        sql.push_str(" ORDER BY state ASC, assigned_at DESC, id DESC;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_assignment_row(row)?);
        }
        Ok(items)
    }

    fn has_review_for_assignment(&self, id: AssignmentId) -> RepoResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM review_records WHERE assignment_id = ?1 LIMIT 1;",
                [id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert_review_record(&self, record: &NewReviewRecord<'_>) -> RepoResult<ReviewRecord> {
        if !record.outcome.is_review_outcome() {
            return Err(RepoError::InvalidData(format!(
                "`{}` is not a review outcome",
                record.outcome
            )));
        }
        self.conn.execute(
            "INSERT INTO review_records
                (submission_id, artifact, assignment_id, reviewer_key, outcome,
                 note, reviewed_at, recorded_by, override_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                record.submission_id.to_string(),
                record.artifact.as_str(),
                record.assignment_id,
                record.reviewer_key.as_str(),
                record.outcome.as_str(),
                record.note,
                record.reviewed_at,
                record.recorded_by,
                record.override_reason,
            ],
        )?;
        Ok(ReviewRecord {
            id: self.conn.last_insert_rowid(),
            submission_id: record.submission_id,
            artifact: record.artifact,
            assignment_id: record.assignment_id,
            reviewer_key: record.reviewer_key.clone(),
            outcome: record.outcome,
            note: record.note.to_string(),
            reviewed_at: record.reviewed_at,
            recorded_by: record.recorded_by.to_string(),
            override_reason: record.override_reason.map(str::to_string),
        })
    }

    fn list_review_records(&self, submission_id: SubmissionId) -> RepoResult<Vec<ReviewRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM review_records
             WHERE submission_id = ?1
             ORDER BY reviewed_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([submission_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_record_row(row)?);
        }
        Ok(items)
    }
}

fn parse_assignment_row(row: &Row<'_>) -> RepoResult<ReviewerAssignment> {
    let submission_id: String = row.get("submission_id")?;
    let artifact: String = row.get("artifact")?;
    let state: String = row.get("state")?;
    Ok(ReviewerAssignment {
        id: row.get("id")?,
        submission_id: parse_uuid(&submission_id, "reviewer_assignments.submission_id")?,
        artifact: parse_enum(&artifact, "reviewer_assignments.artifact", ArtifactKind::parse)?,
        reviewer_key: StaffKey::new(row.get::<_, String>("reviewer_key")?),
        state: parse_enum(&state, "reviewer_assignments.state", AssignmentState::parse)?,
        assigned_at: row.get("assigned_at")?,
        assigned_by: row.get("assigned_by")?,
        closed_at: row.get("closed_at")?,
    })
}

fn parse_record_row(row: &Row<'_>) -> RepoResult<ReviewRecord> {
    let submission_id: String = row.get("submission_id")?;
    let artifact: String = row.get("artifact")?;
    let outcome: String = row.get("outcome")?;
    Ok(ReviewRecord {
        id: row.get("id")?,
        submission_id: parse_uuid(&submission_id, "review_records.submission_id")?,
        artifact: parse_enum(&artifact, "review_records.artifact", ArtifactKind::parse)?,
        assignment_id: row.get("assignment_id")?,
        reviewer_key: StaffKey::new(row.get::<_, String>("reviewer_key")?),
        outcome: parse_enum(&outcome, "review_records.outcome", ReviewStatus::parse)?,
        note: row.get("note")?,
        reviewed_at: row.get("reviewed_at")?,
        recorded_by: row.get("recorded_by")?,
        override_reason: row.get("override_reason")?,
    })
}

#[cfg(test)]
mod tests {
    use super::{NewReviewRecord, ReviewRepository, SqliteReviewRepository};
    use crate::db::open_db_in_memory;
    use crate::model::identity::StaffKey;
    use crate::model::submission::{ArtifactKind, AssignmentState, ReviewStatus};
    use crate::repo::RepoError;
    use uuid::Uuid;

    fn seed_submission(conn: &rusqlite::Connection) -> Uuid {
        conn.execute("INSERT INTO categories (name) VALUES ('PKM-K');", [])
            .unwrap();
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO submissions
                (id, code, code_seq, category_id, title, year, lead_key,
                 created_at, updated_at, updated_by)
             VALUES (?1, 'PKM-K-2026-001', 1, 1, 'Title long enough', 2026, 'S1', 0, 0, 'test');",
            [id.to_string()],
        )
        .unwrap();
        id
    }

    #[test]
    fn second_active_assignment_is_rejected_by_index() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteReviewRepository::new(&conn);
        let id = seed_submission(&conn);

        let first = repo
            .insert_assignment(id, ArtifactKind::Title, &StaffKey::new("R1"), 10, "admin:a")
            .unwrap();
        assert!(matches!(
            repo.insert_assignment(id, ArtifactKind::Title, &StaffKey::new("R2"), 11, "admin:b"),
            Err(RepoError::UniqueViolation(_))
        ));

        repo.close_assignment(first.id, AssignmentState::Superseded, 12)
            .unwrap();
        assert!(matches!(
            repo.close_assignment(first.id, AssignmentState::Cancelled, 13),
            Err(RepoError::NotFound { .. })
        ));
        let second = repo
            .insert_assignment(id, ArtifactKind::Title, &StaffKey::new("R2"), 14, "admin:b")
            .unwrap();
        assert_eq!(
            repo.active_assignment(id, ArtifactKind::Title).unwrap(),
            Some(second)
        );
    }

    #[test]
    fn review_records_are_append_only() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteReviewRepository::new(&conn);
        let id = seed_submission(&conn);
        let reviewer = StaffKey::new("R1");
        let assignment = repo
            .insert_assignment(id, ArtifactKind::Title, &reviewer, 10, "admin:a")
            .unwrap();

        let record = repo
            .insert_review_record(&NewReviewRecord {
                submission_id: id,
                artifact: ArtifactKind::Title,
                assignment_id: assignment.id,
                reviewer_key: &reviewer,
                outcome: ReviewStatus::Accepted,
                note: "clear and feasible",
                reviewed_at: 20,
                recorded_by: "reviewer:R1",
                override_reason: None,
            })
            .unwrap();
        assert!(repo.has_review_for_assignment(assignment.id).unwrap());
        assert_eq!(repo.list_review_records(id).unwrap(), vec![record]);

        assert!(conn
            .execute("UPDATE review_records SET note = 'edited';", [])
            .is_err());
        assert!(conn.execute("DELETE FROM review_records;", []).is_err());
    }
}
