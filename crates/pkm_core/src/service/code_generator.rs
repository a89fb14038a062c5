//! Human-readable submission codes: `{PREFIX}-{CATEGORY}-{YEAR}-{SEQ:3}`.
//!
//! # Invariants
//! - The sequence is reserved and the submission row inserted inside the
//!   caller's transaction, so a crash never burns or duplicates a code.
//! - A unique-index hit on the code reserves the next sequence and retries;
//!   callers only see `Conflict` once the retry budget is spent.

use super::error::{WorkflowError, WorkflowResult};
use crate::model::submission::Submission;
use crate::repo::submission_repo::SubmissionRepository;
use crate::repo::RepoError;

pub fn format_code(prefix: &str, category_short: &str, year: i32, seq: u32) -> String {
    format!("{prefix}-{category_short}-{year}-{seq:03}")
}

/// Assigns `code`/`code_seq` to `submission` and inserts it.
pub fn insert_with_code(
    repo: &impl SubmissionRepository,
    submission: &mut Submission,
    prefix: &str,
    category_short: &str,
    retry_limit: u32,
) -> WorkflowResult<()> {
    let attempts = retry_limit.max(1);
    for attempt in 1..=attempts {
        let seq = repo.next_code_seq(submission.category_id, submission.year)?;
        submission.code_seq = seq;
        submission.code = format_code(prefix, category_short, submission.year, seq);

        match repo.insert_submission(submission) {
            Ok(()) => return Ok(()),
            Err(RepoError::UniqueViolation(_)) => {
                log::warn!(
                    "event=code_generate module=service status=retry code={} attempt={attempt}",
                    submission.code
                );
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(WorkflowError::Conflict {
        target: format!(
            "code sequence {prefix}-{category_short}-{}",
            submission.year
        ),
        detail: format!("no free code after {attempts} attempts"),
    })
}
