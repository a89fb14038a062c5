//! Reference data consumed by the workflow: categories and registration
//! windows.

use serde::{Deserialize, Serialize};

pub type CategoryId = i64;

/// Submission category (e.g. `PKM-K`, `PKM-RE`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub is_active: bool,
}

impl Category {
    /// Short code used inside submission codes.
    ///
    /// `PKM-K` with prefix `PKM` yields `K`; names without the prefix are
    /// used whole.
    pub fn short_code(&self, prefix: &str) -> String {
        let name = self.name.trim();
        let stripped = name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('-'))
            .filter(|rest| !rest.is_empty());
        stripped.unwrap_or(name).to_ascii_uppercase()
    }
}

/// Registration window bounds in epoch milliseconds, inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationWindow {
    pub id: i64,
    pub opens_at: i64,
    pub closes_at: i64,
    pub note: Option<String>,
}

impl RegistrationWindow {
    pub fn state_at(&self, now_epoch_ms: i64) -> WindowState {
        if now_epoch_ms < self.opens_at {
            WindowState::NotYetOpen {
                opens_at: self.opens_at,
            }
        } else if now_epoch_ms > self.closes_at {
            WindowState::Closed {
                closed_at: self.closes_at,
            }
        } else {
            WindowState::Open
        }
    }
}

/// Registration window evaluation at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum WindowState {
    Open,
    NotYetOpen { opens_at: i64 },
    Closed { closed_at: i64 },
    NoActiveWindow,
}

impl WindowState {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}
