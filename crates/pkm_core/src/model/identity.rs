//! Identity keys and records owned by external reference systems.
//!
//! # Responsibility
//! - Give student, staff and organizational-unit keys distinct types so one
//!   cannot be passed where another is expected.
//! - Describe the read-only records the engine receives from providers.
//!
//! # Invariants
//! - Keys are stored trimmed; an empty key is never constructed by the
//!   engine's own normalization paths.
//! - Records are never persisted locally; only their keys are.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::{Display, Formatter};

macro_rules! identity_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Builds a key from raw input, trimming surrounding whitespace.
            pub fn new(value: impl AsRef<str>) -> Self {
                Self(value.as_ref().trim().to_string())
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            pub fn is_blank(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        // Decoded keys go through `new` so they are trimmed like any other.
        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                String::deserialize(deserializer).map(Self::new)
            }
        }
    };
}

identity_key!(
    /// Student registration number in the student records system.
    StudentKey
);
identity_key!(
    /// Staff id in the staff records system.
    StaffKey
);
identity_key!(
    /// Organizational unit code (faculty/study program) in reference data.
    OrgUnitCode
);

/// Student record as served by the student records provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub key: StudentKey,
    pub name: String,
    pub email: Option<String>,
    /// Declared study program; may not resolve in the org-unit provider.
    pub org_unit: Option<OrgUnitCode>,
    pub cohort: Option<String>,
    pub is_active: bool,
}

/// Staff record as served by the staff records provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffRecord {
    pub key: StaffKey,
    pub name: String,
    /// Institutional email. Reviewers must have one.
    pub email: Option<String>,
    pub org_unit: Option<OrgUnitCode>,
    pub expertise: Option<String>,
}

/// Organizational unit record from the reference-data provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgUnitRecord {
    pub code: OrgUnitCode,
    pub name: String,
    pub parent: Option<OrgUnitCode>,
}
