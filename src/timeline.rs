//! Timeline access used by the reconciler and the maintenance scheduler.
//!
//! A [`Timeline`] hands out a cached [`TimelineView`]; callers that need to
//! observe changes made by other components must [`Timeline::refresh`] first.

use async_trait::async_trait;
use thiserror::Error;

use crate::instant::{Instant, InstantAction, InstantState, InstantTime};

/// Errors surfaced by a [`Timeline`] backend.
#[derive(Debug, Error)]
pub enum TimelineError {
    /// The instant record to operate on does not exist.
    #[error("instant {0} not found on timeline")]
    NotFound(Instant),
    /// The requested transition would violate the instant lifecycle.
    #[error("invalid instant transition: {0}")]
    InvalidTransition(String),
    /// Backend failure while reading or mutating instant records.
    #[error("timeline backend error: {0}")]
    Backend(String),
}

/// Immutable, time-ordered snapshot of a timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelineView {
    instants: Vec<Instant>,
}

impl TimelineView {
    /// Build a view, ordering instants by time then action.
    #[must_use]
    pub fn new(mut instants: Vec<Instant>) -> Self {
        instants.sort_by(|a, b| (a.time(), a.action()).cmp(&(b.time(), b.action())));
        Self { instants }
    }

    /// All instants in time order.
    #[must_use]
    pub fn instants(&self) -> &[Instant] {
        &self.instants
    }

    /// Completed instants in time order.
    pub fn completed(&self) -> impl Iterator<Item = &Instant> {
        self.instants.iter().filter(|instant| instant.is_completed())
    }

    /// Requested or inflight instants in time order.
    pub fn pending(&self) -> impl Iterator<Item = &Instant> {
        self.instants
            .iter()
            .filter(|instant| instant.state().is_pending())
    }

    /// Last completed instant with `time`, if any.
    #[must_use]
    pub fn completed_instant_at(&self, time: &InstantTime) -> Option<&Instant> {
        self.completed().filter(|instant| instant.time() == time).last()
    }

    /// Returns `true` when a completed instant with `time` exists.
    #[must_use]
    pub fn contains_completed(&self, time: &InstantTime) -> bool {
        self.completed_instant_at(time).is_some()
    }

    /// Latest completed instant of `action`.
    #[must_use]
    pub fn last_completed_of(&self, action: InstantAction) -> Option<&Instant> {
        self.completed()
            .filter(|instant| instant.action() == action)
            .last()
    }

    /// Pending instants strictly before `time`.
    pub fn pending_before<'a>(
        &'a self,
        time: &'a InstantTime,
    ) -> impl Iterator<Item = &'a Instant> + 'a {
        self.pending().filter(move |instant| instant.time() < time)
    }

    /// Completed instants of `action` strictly after `time`.
    pub fn completed_after<'a>(
        &'a self,
        action: InstantAction,
        time: &'a InstantTime,
    ) -> impl Iterator<Item = &'a Instant> + 'a {
        self.completed()
            .filter(move |instant| instant.action() == action && instant.time() > time)
    }

    /// Any instant, regardless of state, recorded at `time`.
    #[must_use]
    pub fn any_at(&self, time: &InstantTime) -> Option<&Instant> {
        self.instants.iter().find(|instant| instant.time() == time)
    }

    /// State of the instant `(time, action)`, if recorded.
    #[must_use]
    pub fn state_of(&self, time: &InstantTime, action: InstantAction) -> Option<InstantState> {
        self.instants
            .iter()
            .find(|instant| instant.time() == time && instant.action() == action)
            .map(Instant::state)
    }
}

/// Timeline of a table, read through a cached view.
#[async_trait]
pub trait Timeline: Send + Sync {
    /// Currently loaded view; may be stale until [`Timeline::refresh`].
    async fn view(&self) -> Result<TimelineView, TimelineError>;

    /// Physically remove the completion record of `instant`.
    ///
    /// The instant falls back to inflight; earlier lifecycle markers stay.
    async fn delete_completed_instant(&self, instant: &Instant) -> Result<(), TimelineError>;

    /// Reload the view from durable state.
    async fn refresh(&self) -> Result<(), TimelineError>;

    /// Completed instants of the loaded view.
    async fn completed_instants(&self) -> Result<Vec<Instant>, TimelineError> {
        Ok(self.view().await?.completed().cloned().collect())
    }

    /// Latest completed instant of `action` in the loaded view.
    async fn last_completed_instant(
        &self,
        action: InstantAction,
    ) -> Result<Option<Instant>, TimelineError> {
        Ok(self.view().await?.last_completed_of(action).cloned())
    }

    /// Requested and inflight instants of the loaded view.
    async fn pending_instants(&self) -> Result<Vec<Instant>, TimelineError> {
        Ok(self.view().await?.pending().cloned().collect())
    }
}
