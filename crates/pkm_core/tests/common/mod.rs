#![allow(dead_code)]

use pkm_core::identity::{
    OrgUnitDirectory, ProviderError, ProviderKind, ProviderResult, StaffDirectory,
    StudentDirectory,
};
use pkm_core::repo::reference_repo::{ReferenceRepository, SqliteReferenceRepository};
use pkm_core::storage::{DocumentStore, StorageError, StorageLimits, StorageResult};
use pkm_core::{
    open_db_in_memory, Actor, ArtifactKind, AssignReviewerRequest, CategoryId, ConfigError,
    CreateSubmissionRequest, EngineConfig, EngineContext, FixedClock, MemberInput, OrgUnitCode,
    OrgUnitRecord, ReviewService, ReviewStatus, StaffKey, StaffRecord, StudentKey, StudentRecord,
    SubmissionDetail, SubmissionId, SubmissionService, SubmitReviewRequest,
};
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// 2026-03-01T00:00:00Z
pub const NOW: i64 = 1_772_323_200_000;
pub const DAY_MS: i64 = 86_400_000;
pub const TITLE: &str = "Smart irrigation for smallholder rice farms";
pub const ADMIN: &str = "admin01";
pub const REVIEWER: &str = "198701012015041001";
pub const OTHER_REVIEWER: &str = "198905052019032002";

/// Provider behavior switch shared by the fake directories.
#[derive(Default)]
pub struct ProviderMode {
    down: AtomicUsize,
    delay_ms: AtomicU64,
    calls: AtomicUsize,
}

impl ProviderMode {
    pub fn set_down(&self, down: bool) {
        self.down.store(usize::from(down), Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(u64::try_from(delay.as_millis()).unwrap(), Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self, provider: ProviderKind) -> ProviderResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }
        if self.down.load(Ordering::SeqCst) == 1 {
            return Err(ProviderError::unavailable(provider, "connection refused"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeStudents {
    pub mode: ProviderMode,
    records: Mutex<HashMap<StudentKey, StudentRecord>>,
}

impl FakeStudents {
    pub fn add(&self, key: &str, org_unit: Option<&str>) {
        let record = StudentRecord {
            key: StudentKey::new(key),
            name: format!("Student {key}"),
            email: Some(format!("{key}@student.example.ac.id")),
            org_unit: org_unit.map(OrgUnitCode::new),
            cohort: Some("2022".to_string()),
            is_active: true,
        };
        self.records
            .lock()
            .unwrap()
            .insert(record.key.clone(), record);
    }

    pub fn deactivate(&self, key: &str) {
        if let Some(record) = self.records.lock().unwrap().get_mut(&StudentKey::new(key)) {
            record.is_active = false;
        }
    }
}

impl StudentDirectory for FakeStudents {
    fn lookup_students(
        &self,
        keys: &[StudentKey],
    ) -> ProviderResult<HashMap<StudentKey, StudentRecord>> {
        self.mode.enter(ProviderKind::Students)?;
        let records = self.records.lock().unwrap();
        Ok(keys
            .iter()
            .filter_map(|key| records.get(key).map(|r| (key.clone(), r.clone())))
            .collect())
    }
}

#[derive(Default)]
pub struct FakeStaff {
    pub mode: ProviderMode,
    records: Mutex<HashMap<StaffKey, StaffRecord>>,
}

impl FakeStaff {
    pub fn add(&self, key: &str, email: Option<&str>) {
        let record = StaffRecord {
            key: StaffKey::new(key),
            name: format!("Lecturer {key}"),
            email: email.map(str::to_string),
            org_unit: Some(OrgUnitCode::new("FT")),
            expertise: Some("Agricultural engineering".to_string()),
        };
        self.records
            .lock()
            .unwrap()
            .insert(record.key.clone(), record);
    }
}

impl StaffDirectory for FakeStaff {
    fn lookup_staff(&self, keys: &[StaffKey]) -> ProviderResult<HashMap<StaffKey, StaffRecord>> {
        self.mode.enter(ProviderKind::Staff)?;
        let records = self.records.lock().unwrap();
        Ok(keys
            .iter()
            .filter_map(|key| records.get(key).map(|r| (key.clone(), r.clone())))
            .collect())
    }
}

/// Knows `FT` and `TI`; any other code is missing.
#[derive(Default)]
pub struct FakeOrgUnits {
    pub mode: ProviderMode,
}

impl OrgUnitDirectory for FakeOrgUnits {
    fn lookup_org_units(
        &self,
        codes: &[OrgUnitCode],
    ) -> ProviderResult<HashMap<OrgUnitCode, OrgUnitRecord>> {
        self.mode.enter(ProviderKind::OrgUnits)?;
        Ok(codes
            .iter()
            .filter_map(|code| {
                let name = match code.as_str() {
                    "FT" => "Faculty of Engineering",
                    "TI" => "Informatics Engineering",
                    _ => return None,
                };
                let parent = (code.as_str() == "TI").then(|| OrgUnitCode::new("FT"));
                Some((
                    code.clone(),
                    OrgUnitRecord {
                        code: code.clone(),
                        name: name.to_string(),
                        parent,
                    },
                ))
            })
            .collect())
    }
}

/// In-memory document store applying the default size/type limits.
#[derive(Default)]
pub struct MemoryDocuments {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    next_id: AtomicUsize,
    fail_stores: AtomicUsize,
    fail_deletes: AtomicUsize,
}

impl MemoryDocuments {
    pub fn stored(&self) -> Vec<String> {
        let mut names: Vec<String> = self.blobs.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn set_failing_stores(&self, failing: bool) {
        self.fail_stores.store(usize::from(failing), Ordering::SeqCst);
    }

    pub fn set_failing_deletes(&self, failing: bool) {
        self.fail_deletes.store(usize::from(failing), Ordering::SeqCst);
    }

    pub fn remove_behind_engine(&self, document: &str) {
        self.blobs.lock().unwrap().remove(document);
    }
}

impl DocumentStore for MemoryDocuments {
    fn store(&self, bytes: &[u8], name_hint: &str) -> StorageResult<String> {
        let ext = StorageLimits::default()
            .check(bytes, name_hint)
            .map_err(StorageError::Rejected)?;
        if self.fail_stores.load(Ordering::SeqCst) > 0 {
            return Err(StorageError::io(
                "store",
                std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            ));
        }
        let stem = name_hint.rsplit_once('.').map_or(name_hint, |(stem, _)| stem);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let name = format!("{stem}_{id}.{ext}");
        self.blobs
            .lock()
            .unwrap()
            .insert(name.clone(), bytes.to_vec());
        Ok(name)
    }

    fn delete(&self, document: &str) -> StorageResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) > 0 {
            return Err(StorageError::io(
                "delete",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only volume"),
            ));
        }
        self.blobs.lock().unwrap().remove(document);
        Ok(())
    }

    fn exists(&self, document: &str) -> StorageResult<bool> {
        Ok(self.blobs.lock().unwrap().contains_key(document))
    }
}

/// Fake providers and document store shared by one test.
#[derive(Clone)]
pub struct Fakes {
    pub students: Arc<FakeStudents>,
    pub staff: Arc<FakeStaff>,
    pub org_units: Arc<FakeOrgUnits>,
    pub documents: Arc<MemoryDocuments>,
}

impl Fakes {
    /// Students `S1..S6` in `TI` and two reviewers with email.
    pub fn standard() -> Self {
        let students = Arc::new(FakeStudents::default());
        for n in 1..=6 {
            students.add(&format!("S{n}"), Some("TI"));
        }
        let staff = Arc::new(FakeStaff::default());
        staff.add(REVIEWER, Some("reviewer1@example.ac.id"));
        staff.add(OTHER_REVIEWER, Some("reviewer2@example.ac.id"));
        Self {
            students,
            staff,
            org_units: Arc::new(FakeOrgUnits::default()),
            documents: Arc::new(MemoryDocuments::default()),
        }
    }

    pub fn context(&self, config: EngineConfig) -> EngineContext {
        self.try_context(config).unwrap()
    }

    pub fn try_context(&self, config: EngineConfig) -> Result<EngineContext, ConfigError> {
        EngineContext::new(
            config,
            Arc::clone(&self.students) as Arc<dyn StudentDirectory>,
            Arc::clone(&self.staff) as Arc<dyn StaffDirectory>,
            Arc::clone(&self.org_units) as Arc<dyn OrgUnitDirectory>,
            Arc::clone(&self.documents) as Arc<dyn DocumentStore>,
            Arc::new(FixedClock(NOW)),
        )
    }
}

/// Seeds category `PKM-K` and a registration window open at `NOW`.
pub fn seed(conn: &Connection) -> CategoryId {
    let reference = SqliteReferenceRepository::new(conn);
    let category = reference.insert_category("PKM-K", true).unwrap();
    reference
        .insert_window(NOW - DAY_MS, NOW + 30 * DAY_MS, Some("batch 1"))
        .unwrap();
    category.id
}

pub fn create_request(category_id: CategoryId, lead: &str, others: &[&str]) -> CreateSubmissionRequest {
    CreateSubmissionRequest {
        category_id,
        title: TITLE.to_string(),
        lead_key: StudentKey::new(lead),
        members: others.iter().map(|key| MemberInput::new(*key)).collect(),
        form_answers: Vec::new(),
    }
}

/// In-memory database plus a context over the standard fakes.
pub struct TestEngine {
    pub conn: Connection,
    pub ctx: EngineContext,
    pub students: Arc<FakeStudents>,
    pub staff: Arc<FakeStaff>,
    pub org_units: Arc<FakeOrgUnits>,
    pub documents: Arc<MemoryDocuments>,
    pub category_id: CategoryId,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let conn = open_db_in_memory().unwrap();
        let category_id = seed(&conn);
        let fakes = Fakes::standard();
        let ctx = fakes.context(config);
        Self {
            conn,
            ctx,
            students: fakes.students,
            staff: fakes.staff,
            org_units: fakes.org_units,
            documents: fakes.documents,
            category_id,
        }
    }

    pub fn submissions(&mut self) -> SubmissionService<'_> {
        SubmissionService::new(&mut self.conn, &self.ctx)
    }

    pub fn reviews(&mut self) -> ReviewService<'_> {
        ReviewService::new(&mut self.conn, &self.ctx)
    }

    pub fn create_request(&self, lead: &str, others: &[&str]) -> CreateSubmissionRequest {
        create_request(self.category_id, lead, others)
    }

    pub fn create(&mut self, lead: &str, others: &[&str]) -> SubmissionDetail {
        let request = self.create_request(lead, others);
        self.submissions()
            .create_submission(&Actor::student(lead), request)
            .unwrap()
    }

    pub fn assign(&mut self, id: SubmissionId, artifact: ArtifactKind, reviewer: &str) {
        self.reviews()
            .assign_reviewer(
                &Actor::admin(ADMIN),
                &AssignReviewerRequest {
                    submission_id: id,
                    artifact,
                    reviewer_key: StaffKey::new(reviewer),
                    expected_version: None,
                },
            )
            .unwrap();
    }

    pub fn review(
        &mut self,
        id: SubmissionId,
        artifact: ArtifactKind,
        reviewer: &str,
        outcome: ReviewStatus,
    ) {
        self.reviews()
            .submit_review(
                &Actor::reviewer(reviewer),
                &SubmitReviewRequest {
                    submission_id: id,
                    artifact,
                    outcome,
                    note: "Reviewed against the category guidelines.".to_string(),
                    override_reason: None,
                },
            )
            .unwrap();
    }

    /// Assigns `REVIEWER` and records `outcome` on one artifact.
    pub fn review_cycle(&mut self, id: SubmissionId, artifact: ArtifactKind, outcome: ReviewStatus) {
        self.assign(id, artifact, REVIEWER);
        self.review(id, artifact, REVIEWER, outcome);
    }
}

pub fn pdf(name: &str) -> pkm_core::ProposalDocument {
    pkm_core::ProposalDocument::new(name, b"%PDF-1.7 proposal body".to_vec())
}
