//! Bounded, batched access to the identity providers.

use super::{
    Lookup, OrgUnitDirectory, ProviderError, ProviderKind, ProviderResult, Resolution,
    StaffDirectory, StrictLookupError, StudentDirectory,
};
use crate::model::identity::{
    OrgUnitCode, OrgUnitRecord, StaffKey, StaffRecord, StudentKey, StudentRecord,
};
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Student record plus its org unit when that also resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedStudent {
    pub record: StudentRecord,
    pub org_unit: Option<OrgUnitRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedStaff {
    pub record: StaffRecord,
    pub org_unit: Option<OrgUnitRecord>,
}

/// Best-effort read-side view of every identity a page needs.
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    pub students: HashMap<StudentKey, ResolvedStudent>,
    pub staff: HashMap<StaffKey, ResolvedStaff>,
    /// Provider failures swallowed while enriching.
    pub degraded: Vec<ProviderError>,
}

/// Lookup worker threads one resolver (and its clones) may have running.
pub const MAX_LOOKUP_WORKERS: usize = 32;

/// Provider facade shared by every workflow operation.
///
/// Each provider receives at most one batched call per public method, and
/// every call is bounded by `timeout`. A call that overruns is abandoned:
/// its worker thread finishes in the background and the answer is dropped.
/// At most `MAX_LOOKUP_WORKERS` workers run at once; beyond that a lookup
/// fails immediately as unavailable instead of spawning another thread.
#[derive(Clone)]
pub struct IdentityResolver {
    students: Arc<dyn StudentDirectory>,
    staff: Arc<dyn StaffDirectory>,
    org_units: Arc<dyn OrgUnitDirectory>,
    timeout: Duration,
    workers: WorkerBudget,
}

impl IdentityResolver {
    pub fn new(
        students: Arc<dyn StudentDirectory>,
        staff: Arc<dyn StaffDirectory>,
        org_units: Arc<dyn OrgUnitDirectory>,
        timeout: Duration,
    ) -> Self {
        Self {
            students,
            staff,
            org_units,
            timeout,
            workers: WorkerBudget::new(MAX_LOOKUP_WORKERS),
        }
    }

    /// Replaces the default `MAX_LOOKUP_WORKERS` cap.
    pub fn with_worker_limit(mut self, limit: usize) -> Self {
        self.workers = WorkerBudget::new(limit.max(1));
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn lookup_students(&self, keys: &[StudentKey]) -> Lookup<StudentKey, StudentRecord> {
        self.start_students(keys).wait()
    }

    pub fn lookup_staff(&self, keys: &[StaffKey]) -> Lookup<StaffKey, StaffRecord> {
        self.start_staff(keys).wait()
    }

    pub fn lookup_org_units(&self, codes: &[OrgUnitCode]) -> Lookup<OrgUnitCode, OrgUnitRecord> {
        self.start_org_units(codes).wait()
    }

    /// Every key must resolve; used on write paths.
    pub fn require_students(
        &self,
        keys: &[StudentKey],
    ) -> Result<HashMap<StudentKey, StudentRecord>, StrictLookupError<StudentKey>> {
        let lookup = self.lookup_students(keys);
        if let Some(failure) = lookup.failure() {
            return Err(StrictLookupError::Unavailable(failure.clone()));
        }
        let missing = lookup.missing(keys.iter());
        if !missing.is_empty() {
            return Err(StrictLookupError::Missing(missing));
        }
        Ok(lookup.into_found())
    }

    pub fn require_staff(
        &self,
        key: &StaffKey,
    ) -> Result<StaffRecord, StrictLookupError<StaffKey>> {
        match self.lookup_staff(std::slice::from_ref(key)).resolution(key) {
            Resolution::Resolved(record) => Ok(record.clone()),
            Resolution::NotFound => Err(StrictLookupError::Missing(vec![key.clone()])),
            Resolution::DependencyError(failure) => Err(StrictLookupError::Unavailable(failure)),
        }
    }

    /// Read-side enrichment. Never fails; unresolved keys are simply absent.
    ///
    /// Students and staff are fetched concurrently, then all org-unit codes
    /// they reference go out in a single batch.
    pub fn enrich(&self, students: &[StudentKey], staff: &[StaffKey]) -> Enrichment {
        let pending_students = self.start_students(students);
        let pending_staff = self.start_staff(staff);
        let student_lookup = pending_students.wait();
        let staff_lookup = pending_staff.wait();

        let mut degraded = Vec::new();
        degraded.extend(student_lookup.failure().cloned());
        degraded.extend(staff_lookup.failure().cloned());

        let student_records = student_lookup.into_found();
        let staff_records = staff_lookup.into_found();

        let codes: Vec<OrgUnitCode> = student_records
            .values()
            .filter_map(|record| record.org_unit.clone())
            .chain(
                staff_records
                    .values()
                    .filter_map(|record| record.org_unit.clone()),
            )
            .collect();
        let org_lookup = self.lookup_org_units(&codes);
        degraded.extend(org_lookup.failure().cloned());

        let org_unit_of = |code: &Option<OrgUnitCode>| {
            code.as_ref()
                .and_then(|code| org_lookup.get(code))
                .cloned()
        };

        let students = student_records
            .into_iter()
            .map(|(key, record)| {
                let org_unit = org_unit_of(&record.org_unit);
                (key, ResolvedStudent { record, org_unit })
            })
            .collect();
        let staff = staff_records
            .into_iter()
            .map(|(key, record)| {
                let org_unit = org_unit_of(&record.org_unit);
                (key, ResolvedStaff { record, org_unit })
            })
            .collect();

        for failure in &degraded {
            log::warn!(
                "event=identity_enrich module=identity status=degraded provider={} error={}",
                failure.provider.as_str(),
                failure
            );
        }

        Enrichment {
            students,
            staff,
            degraded,
        }
    }

    fn start_students(&self, keys: &[StudentKey]) -> PendingLookup<StudentKey, StudentRecord> {
        let provider = Arc::clone(&self.students);
        start_lookup(ProviderKind::Students, self.timeout, &self.workers, keys, move |keys| {
            provider.lookup_students(keys)
        })
    }

    fn start_staff(&self, keys: &[StaffKey]) -> PendingLookup<StaffKey, StaffRecord> {
        let provider = Arc::clone(&self.staff);
        start_lookup(ProviderKind::Staff, self.timeout, &self.workers, keys, move |keys| {
            provider.lookup_staff(keys)
        })
    }

    fn start_org_units(
        &self,
        codes: &[OrgUnitCode],
    ) -> PendingLookup<OrgUnitCode, OrgUnitRecord> {
        let provider = Arc::clone(&self.org_units);
        start_lookup(ProviderKind::OrgUnits, self.timeout, &self.workers, codes, move |codes| {
            provider.lookup_org_units(codes)
        })
    }
}

enum PendingState<K, V> {
    Empty,
    Failed(ProviderError),
    Waiting {
        rx: Receiver<ProviderResult<HashMap<K, V>>>,
        deadline: Instant,
    },
}

struct PendingLookup<K, V> {
    provider: ProviderKind,
    timeout: Duration,
    started_at: Instant,
    state: PendingState<K, V>,
}

impl<K: Eq + Hash + Clone, V> PendingLookup<K, V> {
    fn wait(self) -> Lookup<K, V> {
        let result = match self.state {
            PendingState::Empty => return Lookup::answered(HashMap::new()),
            PendingState::Failed(err) => Err(err),
            PendingState::Waiting { rx, deadline } => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match rx.recv_timeout(remaining) {
                    Ok(result) => result,
                    Err(RecvTimeoutError::Timeout) => {
                        Err(ProviderError::timeout(self.provider, self.timeout))
                    }
                    Err(RecvTimeoutError::Disconnected) => Err(ProviderError::unavailable(
                        self.provider,
                        "lookup worker ended without an answer",
                    )),
                }
            }
        };

        let duration_ms = self.started_at.elapsed().as_millis();
        match result {
            Ok(found) => {
                log::debug!(
                    "event=identity_lookup module=identity status=ok provider={} found={} duration_ms={duration_ms}",
                    self.provider.as_str(),
                    found.len()
                );
                Lookup::answered(found)
            }
            Err(err) => {
                log::warn!(
                    "event=identity_lookup module=identity status=error provider={} duration_ms={duration_ms} error={err}",
                    self.provider.as_str()
                );
                Lookup::failed(err)
            }
        }
    }
}

fn start_lookup<K, V, F>(
    provider: ProviderKind,
    timeout: Duration,
    workers: &WorkerBudget,
    keys: &[K],
    call: F,
) -> PendingLookup<K, V>
where
    K: Ord + Clone + Send + 'static,
    V: Send + 'static,
    F: FnOnce(&[K]) -> ProviderResult<HashMap<K, V>> + Send + 'static,
{
    let started_at = Instant::now();
    let unique: Vec<K> = keys
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let pending = |state| PendingLookup {
        provider,
        timeout,
        started_at,
        state,
    };
    if unique.is_empty() {
        return pending(PendingState::Empty);
    }

    let Some(slot) = workers.acquire() else {
        return pending(PendingState::Failed(ProviderError::unavailable(
            provider,
            format!("{} lookup workers already running", workers.limit),
        )));
    };

    let (tx, rx) = channel::bounded(1);
    let spawned = thread::Builder::new()
        .name(format!("pkm-lookup-{}", provider.as_str()))
        .spawn(move || {
            let _slot = slot;
            // Receiver may already be gone after a timeout.
            let _ = tx.send(call(&unique));
        });

    match spawned {
        Ok(_) => pending(PendingState::Waiting {
            rx,
            deadline: started_at + timeout,
        }),
        Err(err) => pending(PendingState::Failed(ProviderError::unavailable(
            provider,
            format!("failed to start lookup worker: {err}"),
        ))),
    }
}

/// Shared count of running lookup workers.
#[derive(Clone)]
struct WorkerBudget {
    running: Arc<AtomicUsize>,
    limit: usize,
}

impl WorkerBudget {
    fn new(limit: usize) -> Self {
        Self {
            running: Arc::new(AtomicUsize::new(0)),
            limit,
        }
    }

    fn acquire(&self) -> Option<WorkerSlot> {
        self.running
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |running| {
                (running < self.limit).then_some(running + 1)
            })
            .ok()
            .map(|_| WorkerSlot {
                running: Arc::clone(&self.running),
            })
    }

    #[cfg(test)]
    fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }
}

/// Released when the worker thread ends, including after a timeout.
struct WorkerSlot {
    running: Arc<AtomicUsize>,
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::IdentityResolver;
    use crate::identity::{
        OrgUnitDirectory, ProviderError, ProviderKind, ProviderResult, StaffDirectory,
        StrictLookupError, StudentDirectory,
    };
    use crate::model::identity::{
        OrgUnitCode, OrgUnitRecord, StaffKey, StaffRecord, StudentKey, StudentRecord,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Students {
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl StudentDirectory for Students {
        fn lookup_students(
            &self,
            keys: &[StudentKey],
        ) -> ProviderResult<HashMap<StudentKey, StudentRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            Ok(keys
                .iter()
                .filter(|key| key.as_str().starts_with('S'))
                .map(|key| {
                    let record = StudentRecord {
                        key: key.clone(),
                        name: format!("Student {key}"),
                        email: None,
                        org_unit: Some(OrgUnitCode::new("CS")),
                        cohort: None,
                        is_active: true,
                    };
                    (key.clone(), record)
                })
                .collect())
        }
    }

    struct DownStaff;

    impl StaffDirectory for DownStaff {
        fn lookup_staff(
            &self,
            _keys: &[StaffKey],
        ) -> ProviderResult<HashMap<StaffKey, StaffRecord>> {
            Err(ProviderError::unavailable(ProviderKind::Staff, "503"))
        }
    }

    struct OrgUnits;

    impl OrgUnitDirectory for OrgUnits {
        fn lookup_org_units(
            &self,
            codes: &[OrgUnitCode],
        ) -> ProviderResult<HashMap<OrgUnitCode, OrgUnitRecord>> {
            Ok(codes
                .iter()
                .map(|code| {
                    let record = OrgUnitRecord {
                        code: code.clone(),
                        name: "Computer Science".to_string(),
                        parent: None,
                    };
                    (code.clone(), record)
                })
                .collect())
        }
    }

    fn resolver(students: Arc<Students>, timeout: Duration) -> IdentityResolver {
        IdentityResolver::new(students, Arc::new(DownStaff), Arc::new(OrgUnits), timeout)
    }

    #[test]
    fn strict_lookup_lists_every_missing_key() {
        let students = Arc::new(Students::default());
        let resolver = resolver(Arc::clone(&students), Duration::from_secs(1));
        let keys = [
            StudentKey::new("S1"),
            StudentKey::new("X2"),
            StudentKey::new("X3"),
        ];
        let err = resolver.require_students(&keys).unwrap_err();
        assert_eq!(
            err,
            StrictLookupError::Missing(vec![StudentKey::new("X2"), StudentKey::new("X3")])
        );
        assert_eq!(students.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_batch_skips_provider() {
        let students = Arc::new(Students::default());
        let resolver = resolver(Arc::clone(&students), Duration::from_secs(1));
        assert!(resolver.require_students(&[]).unwrap().is_empty());
        assert_eq!(students.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn slow_provider_is_reported_as_timeout() {
        let students = Arc::new(Students {
            calls: AtomicUsize::new(0),
            delay: Some(Duration::from_millis(400)),
        });
        let resolver = resolver(students, Duration::from_millis(50));
        let started = Instant::now();
        let err = resolver
            .require_students(&[StudentKey::new("S1")])
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_millis(350));
        match err {
            StrictLookupError::Unavailable(failure) => assert!(failure.is_timeout()),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn strict_staff_lookup_reports_outage() {
        let resolver = resolver(Arc::new(Students::default()), Duration::from_secs(1));
        match resolver.require_staff(&StaffKey::new("T1")) {
            Err(StrictLookupError::Unavailable(failure)) => {
                assert_eq!(failure.provider, ProviderKind::Staff);
                assert!(!failure.is_timeout());
            }
            other => panic!("expected outage, got {other:?}"),
        }
    }

    #[test]
    fn hung_workers_are_capped() {
        let students = Arc::new(Students {
            calls: AtomicUsize::new(0),
            delay: Some(Duration::from_millis(300)),
        });
        let resolver =
            resolver(Arc::clone(&students), Duration::from_millis(30)).with_worker_limit(1);
        let keys = [StudentKey::new("S1")];

        match resolver.require_students(&keys).unwrap_err() {
            StrictLookupError::Unavailable(failure) => assert!(failure.is_timeout()),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(resolver.workers.running(), 1);

        match resolver.require_students(&keys).unwrap_err() {
            StrictLookupError::Unavailable(failure) => assert!(!failure.is_timeout()),
            other => panic!("expected refusal, got {other:?}"),
        }
        assert_eq!(students.calls.load(Ordering::SeqCst), 1);

        let deadline = Instant::now() + Duration::from_secs(2);
        while resolver.workers.running() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(resolver.workers.running(), 0);
    }

    #[test]
    fn enrichment_degrades_instead_of_failing() {
        let students = Arc::new(Students::default());
        let resolver = resolver(students, Duration::from_secs(1));
        let enrichment = resolver.enrich(
            &[StudentKey::new("S1"), StudentKey::new("X9")],
            &[StaffKey::new("T1")],
        );
        let student = enrichment.students.get(&StudentKey::new("S1")).unwrap();
        assert_eq!(
            student.org_unit.as_ref().map(|unit| unit.name.as_str()),
            Some("Computer Science")
        );
        assert!(!enrichment.students.contains_key(&StudentKey::new("X9")));
        assert!(enrichment.staff.is_empty());
        assert_eq!(enrichment.degraded.len(), 1);
        assert_eq!(enrichment.degraded[0].provider, ProviderKind::Staff);
    }
}
