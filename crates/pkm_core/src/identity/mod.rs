//! Cross-system identity resolution.
//!
//! # Responsibility
//! - Define the read-only provider seams for student, staff and
//!   organizational-unit records.
//! - Model lookup results as `Resolved | NotFound | DependencyError`, never
//!   as booleans.
//!
//! # Invariants
//! - Providers are independent; none is assumed to agree with another.
//! - A provider answers a whole batch; keys it does not know are absent
//!   from the returned map rather than failing the batch.

use crate::model::identity::{
    OrgUnitCode, OrgUnitRecord, StaffKey, StaffRecord, StudentKey, StudentRecord,
};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::hash::Hash;
use std::time::Duration;

mod resolver;

pub use resolver::{Enrichment, IdentityResolver, ResolvedStaff, ResolvedStudent};

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Student records system.
pub trait StudentDirectory: Send + Sync {
    fn lookup_students(
        &self,
        keys: &[StudentKey],
    ) -> ProviderResult<HashMap<StudentKey, StudentRecord>>;
}

/// Staff records system.
pub trait StaffDirectory: Send + Sync {
    fn lookup_staff(&self, keys: &[StaffKey]) -> ProviderResult<HashMap<StaffKey, StaffRecord>>;
}

/// Organizational reference-data system.
pub trait OrgUnitDirectory: Send + Sync {
    fn lookup_org_units(
        &self,
        codes: &[OrgUnitCode],
    ) -> ProviderResult<HashMap<OrgUnitCode, OrgUnitRecord>>;
}

/// Which external system a lookup went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Students,
    Staff,
    OrgUnits,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Students => "students",
            Self::Staff => "staff",
            Self::OrgUnits => "org_units",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderFailure {
    /// No answer within the per-call bound.
    Timeout { after_ms: u64 },
    /// Provider answered with an error (network, auth, schema drift).
    Unavailable(String),
}

/// Failed provider call. Always retryable from the engine's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub provider: ProviderKind,
    pub failure: ProviderFailure,
}

impl ProviderError {
    pub fn unavailable(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            failure: ProviderFailure::Unavailable(message.into()),
        }
    }

    pub fn timeout(provider: ProviderKind, after: Duration) -> Self {
        Self {
            provider,
            failure: ProviderFailure::Timeout {
                after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
            },
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.failure, ProviderFailure::Timeout { .. })
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.failure {
            ProviderFailure::Timeout { after_ms } => write!(
                f,
                "{} provider did not answer within {after_ms} ms",
                self.provider.as_str()
            ),
            ProviderFailure::Unavailable(message) => {
                write!(f, "{} provider unavailable: {message}", self.provider.as_str())
            }
        }
    }
}

impl Error for ProviderError {}

/// Outcome of resolving one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    Resolved(T),
    NotFound,
    DependencyError(ProviderError),
}

/// Answer of one batched provider call.
#[derive(Debug, Clone)]
pub struct Lookup<K, V> {
    found: HashMap<K, V>,
    failure: Option<ProviderError>,
}

impl<K: Eq + Hash + Clone, V> Lookup<K, V> {
    pub(crate) fn answered(found: HashMap<K, V>) -> Self {
        Self {
            found,
            failure: None,
        }
    }

    pub(crate) fn failed(failure: ProviderError) -> Self {
        Self {
            found: HashMap::new(),
            failure: Some(failure),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.found.get(key)
    }

    pub fn resolution(&self, key: &K) -> Resolution<&V> {
        match (self.found.get(key), &self.failure) {
            (Some(value), _) => Resolution::Resolved(value),
            (None, Some(failure)) => Resolution::DependencyError(failure.clone()),
            (None, None) => Resolution::NotFound,
        }
    }

    pub fn failure(&self) -> Option<&ProviderError> {
        self.failure.as_ref()
    }

    /// Requested keys the provider did not return, in request order.
    pub fn missing<'a>(&self, requested: impl IntoIterator<Item = &'a K>) -> Vec<K>
    where
        K: 'a,
    {
        requested
            .into_iter()
            .filter(|key| !self.found.contains_key(*key))
            .cloned()
            .collect()
    }

    pub fn into_found(self) -> HashMap<K, V> {
        self.found
    }
}

/// Strict lookup failure; maps to `Unresolved*` or `DependencyUnavailable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrictLookupError<K> {
    Missing(Vec<K>),
    Unavailable(ProviderError),
}
