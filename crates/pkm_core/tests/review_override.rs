mod common;

use common::{TestEngine, ADMIN, REVIEWER};
use pkm_core::{
    Actor, ArtifactKind, ReviewStatus, SubmissionId, SubmitReviewRequest, WorkflowError,
};

fn request(id: SubmissionId, outcome: ReviewStatus, reason: Option<&str>) -> SubmitReviewRequest {
    SubmitReviewRequest {
        submission_id: id,
        artifact: ArtifactKind::Title,
        outcome,
        note: "Scope is realistic for a one-year grant.".to_string(),
        override_reason: reason.map(str::to_string),
    }
}

fn under_review() -> (TestEngine, SubmissionId) {
    let mut engine = TestEngine::new();
    let id = engine.create("S1", &[]).submission.id;
    engine.assign(id, ArtifactKind::Title, REVIEWER);
    (engine, id)
}

#[test]
fn admin_override_requires_a_reason() {
    let (mut engine, id) = under_review();
    let admin = Actor::admin(ADMIN);

    for reason in [None, Some("   ")] {
        let err = engine
            .reviews()
            .submit_review(&admin, &request(id, ReviewStatus::Accepted, reason))
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Validation(ref field) if field.field == "override_reason"
        ));
    }
    let detail = engine.submissions().get_detail(id).unwrap();
    assert_eq!(detail.submission.title_status, ReviewStatus::UnderReview);
    assert!(detail.reviews.is_empty());
}

#[test]
fn admin_override_keeps_both_identities_on_the_record() {
    let (mut engine, id) = under_review();

    let record = engine
        .reviews()
        .submit_review(
            &Actor::admin(ADMIN),
            &request(
                id,
                ReviewStatus::Accepted,
                Some(" reviewer account not linked yet "),
            ),
        )
        .unwrap();
    assert_eq!(record.reviewer_key.as_str(), REVIEWER);
    assert_eq!(record.recorded_by, format!("admin:{ADMIN}"));
    assert_eq!(
        record.override_reason.as_deref(),
        Some("reviewer account not linked yet")
    );

    let detail = engine.submissions().get_detail(id).unwrap();
    assert_eq!(detail.submission.title_status, ReviewStatus::Accepted);
    assert_eq!(detail.reviews.len(), 1);
}

#[test]
fn reviewers_record_without_override() {
    let (mut engine, id) = under_review();
    let record = engine
        .reviews()
        .submit_review(
            &Actor::reviewer(REVIEWER),
            &request(id, ReviewStatus::Rejected, Some("ignored")),
        )
        .unwrap();
    assert_eq!(record.override_reason, None);
    assert_eq!(record.recorded_by, format!("reviewer:{REVIEWER}"));
    assert_eq!(record.outcome, ReviewStatus::Rejected);
}

#[test]
fn students_and_bad_inputs_are_refused() {
    let (mut engine, id) = under_review();

    let err = engine
        .reviews()
        .submit_review(&Actor::student("S1"), &request(id, ReviewStatus::Accepted, None))
        .unwrap_err();
    assert_eq!(err.kind(), "not_permitted");

    let err = engine
        .reviews()
        .submit_review(
            &Actor::reviewer(REVIEWER),
            &request(id, ReviewStatus::UnderReview, None),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ref field) if field.field == "outcome"
    ));

    let mut short = request(id, ReviewStatus::Accepted, None);
    short.note = " ok ".to_string();
    let err = engine
        .reviews()
        .submit_review(&Actor::reviewer(REVIEWER), &short)
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ref field) if field.field == "note"
    ));
}

#[test]
fn second_review_on_a_closed_assignment_is_an_invalid_transition() {
    let (mut engine, id) = under_review();
    engine.review(id, ArtifactKind::Title, REVIEWER, ReviewStatus::NeedsRevision);

    let err = engine
        .reviews()
        .submit_review(
            &Actor::reviewer(REVIEWER),
            &request(id, ReviewStatus::Accepted, None),
        )
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition(_)));

    let err = engine
        .reviews()
        .cancel_assignment(&Actor::admin(ADMIN), id, ArtifactKind::Title)
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition(_)));
}

#[test]
fn review_history_accumulates_across_revisions() {
    let (mut engine, id) = under_review();
    engine.review(id, ArtifactKind::Title, REVIEWER, ReviewStatus::NeedsRevision);
    engine
        .submissions()
        .revise_title(
            &Actor::student("S1"),
            pkm_core::ReviseTitleRequest {
                submission_id: id,
                title: "Solar-powered irrigation pumps for rice farms".to_string(),
                members: None,
                form_answers: None,
            },
        )
        .unwrap();
    engine.review_cycle(id, ArtifactKind::Title, ReviewStatus::Accepted);

    let detail = engine.submissions().get_detail(id).unwrap();
    let outcomes: Vec<ReviewStatus> = detail.reviews.iter().map(|r| r.record.outcome).collect();
    assert_eq!(
        outcomes,
        vec![ReviewStatus::NeedsRevision, ReviewStatus::Accepted]
    );
    assert_eq!(detail.assignments.len(), 2);
}
