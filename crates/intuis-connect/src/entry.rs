//! Config entries and their lifecycle
//!
//! ```text
//! NotLoaded → SetupInProgress → Loaded
//!                            ↘ SetupRetry → SetupInProgress
//!                            ↘ SetupError → SetupInProgress
//!
//! Loaded/SetupRetry/SetupError → UnloadInProgress → NotLoaded
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{DEFAULT_MEASURE_SCALE, DEFAULT_UPDATE_INTERVAL_SECS, DOMAIN};

/// Config entry lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    #[default]
    NotLoaded,
    SetupInProgress,
    Loaded,
    /// First refresh failed, setup can be retried
    SetupRetry,
    SetupError,
    UnloadInProgress,
}

/// Error when an invalid state transition is attempted
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot move entry from {from:?} to {to:?}: {reason}")]
pub struct InvalidTransition {
    pub from: EntryState,
    pub to: EntryState,
    pub reason: &'static str,
}

impl EntryState {
    /// Returns the new state if the transition is allowed
    pub fn try_transition(self, to: EntryState) -> Result<EntryState, InvalidTransition> {
        use EntryState::*;

        let valid = matches!(
            (self, to),
            (NotLoaded, SetupInProgress)
                | (SetupInProgress, Loaded)
                | (SetupInProgress, SetupRetry)
                | (SetupInProgress, SetupError)
                | (SetupRetry, SetupInProgress)
                | (SetupError, SetupInProgress)
                | (Loaded, UnloadInProgress)
                | (SetupRetry, UnloadInProgress)
                | (SetupError, UnloadInProgress)
                | (UnloadInProgress, NotLoaded)
        );

        if valid {
            Ok(to)
        } else {
            Err(InvalidTransition {
                from: self,
                to,
                reason: Self::transition_error_reason(self, to),
            })
        }
    }

    pub fn can_transition_to(self, to: EntryState) -> bool {
        self.try_transition(to).is_ok()
    }

    fn transition_error_reason(from: EntryState, to: EntryState) -> &'static str {
        use EntryState::*;

        match (from, to) {
            (NotLoaded, Loaded) => "entities exist only after a first coordinator refresh",
            (NotLoaded, UnloadInProgress) => "no coordinator is polling for this entry",
            (Loaded, SetupInProgress) => "entities are already registered for this account",
            (Loaded, NotLoaded) => "the polling task must be stopped before the entry is released",
            (SetupInProgress, NotLoaded) => "the first refresh has not finished yet",
            (UnloadInProgress, Loaded) => "the coordinator is already shutting down",
            _ => "not a step of the entry lifecycle",
        }
    }
}

/// Account credentials stored in the entry
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryData {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for EntryData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryData")
            .field("username", &self.username)
            .field("password", &"**REDACTED**")
            .finish()
    }
}

/// User tunable options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOptions {
    /// Polling interval in seconds
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,

    /// `gethomemeasure` scale of the energy sensor
    #[serde(default = "default_measure_scale")]
    pub measure_scale: String,
}

fn default_update_interval() -> u64 {
    DEFAULT_UPDATE_INTERVAL_SECS
}

fn default_measure_scale() -> String {
    DEFAULT_MEASURE_SCALE.to_string()
}

impl Default for EntryOptions {
    fn default() -> Self {
        Self {
            update_interval: default_update_interval(),
            measure_scale: default_measure_scale(),
        }
    }
}

impl EntryOptions {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval)
    }
}

/// One configured Intuis account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Unique identifier (ULID)
    pub entry_id: String,

    pub domain: String,

    pub title: String,

    /// Lowercased account email
    pub unique_id: String,

    pub data: EntryData,

    #[serde(default)]
    pub options: EntryOptions,

    /// Current lifecycle state (not persisted)
    #[serde(skip, default)]
    pub state: EntryState,

    /// Explanation for failed states
    #[serde(skip, default)]
    pub reason: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ConfigEntry {
    pub fn new(
        title: impl Into<String>,
        unique_id: impl Into<String>,
        data: EntryData,
        options: EntryOptions,
    ) -> Self {
        Self {
            entry_id: ulid::Ulid::new().to_string(),
            domain: DOMAIN.to_string(),
            title: title.into(),
            unique_id: unique_id.into(),
            data,
            options,
            state: EntryState::NotLoaded,
            reason: None,
            created_at: Utc::now(),
        }
    }

    /// Move to `to`, clearing the reason
    pub fn transition(&mut self, to: EntryState) -> Result<(), InvalidTransition> {
        self.state = self.state.try_transition(to)?;
        self.reason = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EntryState::*;

    #[test]
    fn test_setup_paths() {
        assert_eq!(NotLoaded.try_transition(SetupInProgress), Ok(SetupInProgress));
        assert!(SetupInProgress.can_transition_to(Loaded));
        assert!(SetupInProgress.can_transition_to(SetupRetry));
        assert!(SetupInProgress.can_transition_to(SetupError));
        assert!(SetupRetry.can_transition_to(SetupInProgress));
    }

    #[test]
    fn test_unload_path() {
        assert!(Loaded.can_transition_to(UnloadInProgress));
        assert!(SetupRetry.can_transition_to(UnloadInProgress));
        assert!(UnloadInProgress.can_transition_to(NotLoaded));
    }

    #[test]
    fn test_invalid_transitions() {
        let err = NotLoaded.try_transition(Loaded).unwrap_err();
        assert_eq!(err.from, NotLoaded);
        assert_eq!(err.to, Loaded);
        assert!(err.reason.contains("first coordinator refresh"));

        assert!(!Loaded.can_transition_to(SetupInProgress));
        assert!(!Loaded.can_transition_to(NotLoaded));
        assert!(!UnloadInProgress.can_transition_to(Loaded));
    }

    #[test]
    fn test_entry_defaults() {
        let entry = ConfigEntry::new(
            "Intuis (a@b.c)",
            "a@b.c",
            EntryData {
                username: "a@b.c".into(),
                password: "pw".into(),
            },
            EntryOptions::default(),
        );
        assert_eq!(entry.state, NotLoaded);
        assert_eq!(entry.domain, "intuis_connect");
        assert_eq!(entry.entry_id.len(), 26);
        assert_eq!(entry.options.update_interval(), Duration::from_secs(90));
        assert_eq!(entry.options.measure_scale, "1day");
        assert!(!format!("{:?}", entry.data).contains("pw"));
    }

    #[test]
    fn test_options_deserialize_defaults() {
        let options: EntryOptions = serde_json::from_str(r#"{"update_interval": 30}"#).unwrap();
        assert_eq!(options.update_interval, 30);
        assert_eq!(options.measure_scale, "1day");
    }
}
