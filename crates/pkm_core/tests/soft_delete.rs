mod common;

use common::{TestEngine, ADMIN, REVIEWER};
use pkm_core::{
    Actor, ArtifactKind, NotFoundTarget, StaffKey, SubmissionQuery, WorkflowError,
};

#[test]
fn deleted_submission_disappears_from_every_read_path() {
    let mut engine = TestEngine::new();
    let id = engine.create("S1", &["S2"]).submission.id;
    let kept = engine.create("S3", &[]).submission.id;
    engine.assign(id, ArtifactKind::Title, REVIEWER);
    let admin = Actor::admin(ADMIN);

    engine.submissions().delete_submission(&admin, id).unwrap();

    let err = engine.submissions().get_detail(id).unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::NotFound(NotFoundTarget::Submission(missing)) if missing == id
    ));
    let page = engine
        .submissions()
        .list_submissions(&admin, &SubmissionQuery::default())
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].submission.id, kept);
    let work = engine
        .reviews()
        .list_reviewer_assignments(&admin, &StaffKey::new(REVIEWER), None)
        .unwrap();
    assert!(work.is_empty());

    let err = engine.submissions().delete_submission(&admin, id).unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[test]
fn deleted_codes_are_never_handed_out_again() {
    let mut engine = TestEngine::new();
    let first = engine.create("S1", &[]).submission;
    engine
        .submissions()
        .delete_submission(&Actor::admin(ADMIN), first.id)
        .unwrap();

    let second = engine.create("S1", &["S2"]).submission;
    assert_eq!(first.code, "PKM-K-2026-001");
    assert_eq!(second.code, "PKM-K-2026-002");
}

#[test]
fn only_administrators_delete() {
    let mut engine = TestEngine::new();
    let id = engine.create("S1", &[]).submission.id;
    for actor in [Actor::student("S1"), Actor::reviewer(REVIEWER)] {
        let err = engine.submissions().delete_submission(&actor, id).unwrap_err();
        assert_eq!(err.kind(), "not_permitted");
    }
    assert!(engine.submissions().get_detail(id).is_ok());
}
