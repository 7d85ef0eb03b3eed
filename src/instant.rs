//! Instant identifiers and the suffix scheme used to derive maintenance instants.
//!
//! Instant times are digit strings (for example `20230101000000`) compared
//! lexicographically. Parsing accepts any width; keeping organically generated
//! instants of one table at a single width is the caller's job, since only
//! equal-width times order the same lexicographically and chronologically.
//!
//! A maintenance instant is derived by appending a fixed-width digit suffix to
//! a base instant. It sorts strictly after the base and, given equal-width
//! organic instants, strictly before any organic instant greater than the base.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Instant time assigned to file groups created by table bootstrap.
pub const INIT_INSTANT_TIME: &str = "00000000000000";

/// Errors raised while parsing instant identifiers or suffixes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstantError {
    /// The identifier was empty.
    #[error("instant time must not be empty")]
    Empty,
    /// The identifier contained something other than ASCII digits.
    #[error("instant time `{0}` must contain only ascii digits")]
    NonDigit(String),
}

/// Sortable identifier for one action on a timeline.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstantTime(String);

impl InstantTime {
    /// Parse an instant time, rejecting empty or non-numeric identifiers.
    pub fn parse(value: impl Into<String>) -> Result<Self, InstantError> {
        let value = value.into();
        validate_digits(&value)?;
        Ok(Self(value))
    }

    /// Instant used as the base of bootstrapped file groups.
    #[must_use]
    pub fn init() -> Self {
        Self(INIT_INSTANT_TIME.to_string())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the instant obtained by appending `suffix` to `self`.
    #[must_use]
    pub fn with_suffix(&self, suffix: &InstantSuffix) -> Self {
        let mut raw = String::with_capacity(self.0.len() + suffix.0.len());
        raw.push_str(&self.0);
        raw.push_str(&suffix.0);
        Self(raw)
    }

    /// Returns `true` when `self` sorts strictly before `other`.
    #[must_use]
    pub fn is_before(&self, other: &InstantTime) -> bool {
        self < other
    }
}

impl TryFrom<String> for InstantTime {
    type Error = InstantError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for InstantTime {
    type Error = InstantError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<InstantTime> for String {
    fn from(value: InstantTime) -> Self {
        value.0
    }
}

impl fmt::Display for InstantTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for InstantTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InstantTime").field(&self.0).finish()
    }
}

/// Fixed digit suffix appended to a base instant to derive a maintenance instant.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstantSuffix(String);

impl InstantSuffix {
    /// Parse a suffix; it must be a non-empty run of ASCII digits.
    pub fn parse(value: impl Into<String>) -> Result<Self, InstantError> {
        let value = value.into();
        validate_digits(&value)?;
        Ok(Self(value))
    }

    /// Suffix reserved for compaction instants.
    #[must_use]
    pub fn compaction() -> Self {
        Self("001".to_string())
    }

    /// Suffix reserved for clean instants.
    #[must_use]
    pub fn clean() -> Self {
        Self("002".to_string())
    }

    /// Borrow the raw suffix.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of digits in the suffix.
    #[must_use]
    pub fn width(&self) -> usize {
        self.0.len()
    }
}

impl TryFrom<String> for InstantSuffix {
    type Error = InstantError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<InstantSuffix> for String {
    fn from(value: InstantSuffix) -> Self {
        value.0
    }
}

impl fmt::Debug for InstantSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InstantSuffix").field(&self.0).finish()
    }
}

fn validate_digits(value: &str) -> Result<(), InstantError> {
    if value.is_empty() {
        return Err(InstantError::Empty);
    }
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(InstantError::NonDigit(value.to_string()));
    }
    Ok(())
}

/// Kind of action recorded by an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InstantAction {
    /// Full base-file commit on a copy-on-write table.
    Commit,
    /// Incremental log commit.
    DeltaCommit,
    /// Merge of log blocks into a new base file.
    Compaction,
    /// Removal of superseded file slices.
    Clean,
    /// Undo of a failed action.
    Rollback,
}

/// Lifecycle state of an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InstantState {
    /// Planned but not yet started.
    Requested,
    /// Started but not yet completed.
    Inflight,
    /// Durably completed.
    Completed,
}

impl InstantState {
    /// Requested and inflight instants are pending.
    #[must_use]
    pub fn is_pending(self) -> bool {
        !matches!(self, InstantState::Completed)
    }
}

/// One entry on a timeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instant {
    time: InstantTime,
    action: InstantAction,
    state: InstantState,
}

impl Instant {
    /// Construct an instant.
    #[must_use]
    pub fn new(time: InstantTime, action: InstantAction, state: InstantState) -> Self {
        Self {
            time,
            action,
            state,
        }
    }

    /// Instant time.
    #[must_use]
    pub fn time(&self) -> &InstantTime {
        &self.time
    }

    /// Action kind.
    #[must_use]
    pub fn action(&self) -> InstantAction {
        self.action
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> InstantState {
        self.state
    }

    /// Returns `true` when the instant is completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == InstantState::Completed
    }

    /// Same instant moved to `state`.
    #[must_use]
    pub fn with_state(&self, state: InstantState) -> Self {
        Self {
            time: self.time.clone(),
            action: self.action,
            state,
        }
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}__{:?}__{:?}]", self.time, self.action, self.state)
    }
}
