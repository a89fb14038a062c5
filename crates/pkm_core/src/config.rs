//! Engine configuration.
//!
//! # Responsibility
//! - Hold tunables the boundary layer may override (code prefix, team size,
//!   provider timeout, text length rules).
//! - Reject inconsistent values before an engine is built from them.
//!
//! # Invariants
//! - `EngineConfig::default()` always passes `validate()`.
//! - Loading from files/env happens outside the engine; this module only
//!   parses an already-read JSON document.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const DEFAULT_CODE_PREFIX: &str = "PKM";
pub const DEFAULT_MAX_TEAM_SIZE: usize = 5;
/// Hard cap on team size, lead included. `max_team_size` may only lower it.
pub const TEAM_SIZE_LIMIT: usize = 5;
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_TITLE_MIN_CHARS: usize = 10;
pub const DEFAULT_TITLE_MAX_CHARS: usize = 500;
pub const DEFAULT_REVIEW_NOTE_MIN_CHARS: usize = 10;
pub const DEFAULT_CODE_RETRY_LIMIT: u32 = 16;

/// Tunables for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Leading segment of every submission code.
    pub code_prefix: String,
    /// Upper bound for team size, lead included.
    pub max_team_size: usize,
    /// Per-call bound for every external provider lookup.
    pub provider_timeout_ms: u64,
    pub title_min_chars: usize,
    pub title_max_chars: usize,
    pub review_note_min_chars: usize,
    /// Insert attempts before a code collision surfaces as a conflict.
    pub code_retry_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            code_prefix: DEFAULT_CODE_PREFIX.to_string(),
            max_team_size: DEFAULT_MAX_TEAM_SIZE,
            provider_timeout_ms: DEFAULT_PROVIDER_TIMEOUT_MS,
            title_min_chars: DEFAULT_TITLE_MIN_CHARS,
            title_max_chars: DEFAULT_TITLE_MAX_CHARS,
            review_note_min_chars: DEFAULT_REVIEW_NOTE_MIN_CHARS,
            code_retry_limit: DEFAULT_CODE_RETRY_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Parses a JSON document; missing fields fall back to defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = self.code_prefix.as_str();
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::Invalid {
                field: "code_prefix",
                message: format!("must be non-empty ASCII alphanumeric, got `{prefix}`"),
            });
        }
        if self.max_team_size == 0 || self.max_team_size > TEAM_SIZE_LIMIT {
            return Err(ConfigError::Invalid {
                field: "max_team_size",
                message: format!("must be in 1..={TEAM_SIZE_LIMIT}, got {}", self.max_team_size),
            });
        }
        if self.provider_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "provider_timeout_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.title_min_chars == 0 || self.title_min_chars > self.title_max_chars {
            return Err(ConfigError::Invalid {
                field: "title_min_chars",
                message: format!(
                    "must be in 1..={}, got {}",
                    self.title_max_chars, self.title_min_chars
                ),
            });
        }
        if self.code_retry_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "code_retry_limit",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    Invalid { field: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(message) => write!(f, "invalid engine config: {message}"),
            Self::Invalid { field, message } => {
                write!(f, "invalid engine config field `{field}`: {message}")
            }
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EngineConfig};

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(r#"{"provider_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.provider_timeout_ms, 250);
        assert_eq!(config.code_prefix, "PKM");
        assert_eq!(config.max_team_size, 5);
    }

    #[test]
    fn team_size_above_limit_is_rejected() {
        let config = EngineConfig {
            max_team_size: 6,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "max_team_size",
                ..
            })
        ));
        let smaller = EngineConfig {
            max_team_size: 3,
            ..EngineConfig::default()
        };
        assert!(smaller.validate().is_ok());
    }

    #[test]
    fn padded_code_prefix_is_rejected() {
        let err = EngineConfig::from_json_str(r#"{"code_prefix": " PKM"}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "code_prefix",
                ..
            }
        ));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = EngineConfig::from_json_str(r#"{"provider_timeout_ms": 0}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "provider_timeout_ms",
                ..
            }
        ));
    }
}
