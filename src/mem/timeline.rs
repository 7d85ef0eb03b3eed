//! In-memory timeline with a cached view, refreshed on demand.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    instant::{Instant, InstantAction, InstantState, InstantTime},
    timeline::{Timeline, TimelineError, TimelineView},
};

/// Durable instant records shared by a table and its timeline handles.
#[derive(Debug, Default)]
pub(crate) struct InstantLog {
    entries: BTreeMap<(InstantTime, InstantAction), InstantState>,
}

impl InstantLog {
    pub(crate) fn view(&self) -> TimelineView {
        TimelineView::new(
            self.entries
                .iter()
                .map(|((time, action), state)| Instant::new(time.clone(), *action, *state))
                .collect(),
        )
    }

    pub(crate) fn state_of(&self, time: &InstantTime, action: InstantAction) -> Option<InstantState> {
        self.entries.get(&(time.clone(), action)).copied()
    }

    pub(crate) fn contains_time(&self, time: &InstantTime) -> bool {
        self.entries.keys().any(|(entry, _)| entry == time)
    }

    /// Move `(time, action)` forward to `state`; moving backwards is rejected.
    pub(crate) fn transition(
        &mut self,
        time: &InstantTime,
        action: InstantAction,
        state: InstantState,
    ) -> Result<(), TimelineError> {
        let key = (time.clone(), action);
        if let Some(current) = self.entries.get(&key)
            && *current > state
        {
            return Err(TimelineError::InvalidTransition(format!(
                "{time} {action:?} cannot move from {current:?} to {state:?}"
            )));
        }
        self.entries.insert(key, state);
        Ok(())
    }

    pub(crate) fn remove_completed(&mut self, instant: &Instant) -> Result<(), TimelineError> {
        let key = (instant.time().clone(), instant.action());
        match self.entries.get_mut(&key) {
            Some(state) if *state == InstantState::Completed => {
                *state = InstantState::Inflight;
                Ok(())
            }
            _ => Err(TimelineError::NotFound(instant.clone())),
        }
    }

    /// Whether `time` is a completed delta commit.
    pub(crate) fn is_completed_delta(&self, time: &InstantTime) -> bool {
        self.state_of(time, InstantAction::DeltaCommit) == Some(InstantState::Completed)
    }
}

/// Timeline handle over an [`InstantLog`], serving a cached view until refreshed.
#[derive(Debug, Clone)]
pub struct MemTimeline {
    log: Arc<RwLock<InstantLog>>,
    loaded: Arc<RwLock<TimelineView>>,
}

impl MemTimeline {
    /// Standalone timeline, typically standing in for the data table's timeline.
    #[must_use]
    pub fn new() -> Self {
        Self::over(Arc::new(RwLock::new(InstantLog::default())))
    }

    pub(crate) fn over(log: Arc<RwLock<InstantLog>>) -> Self {
        let loaded = log.read().view();
        Self {
            log,
            loaded: Arc::new(RwLock::new(loaded)),
        }
    }

    /// Record `instant` durably. Loaded views are unaffected until refresh.
    pub fn record(&self, instant: &Instant) -> Result<(), TimelineError> {
        self.log
            .write()
            .transition(instant.time(), instant.action(), instant.state())
    }

    /// View of the durable state, bypassing the cache.
    #[must_use]
    pub fn durable_view(&self) -> TimelineView {
        self.log.read().view()
    }
}

impl Default for MemTimeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Timeline for MemTimeline {
    async fn view(&self) -> Result<TimelineView, TimelineError> {
        Ok(self.loaded.read().clone())
    }

    async fn delete_completed_instant(&self, instant: &Instant) -> Result<(), TimelineError> {
        self.log.write().remove_completed(instant)
    }

    async fn refresh(&self) -> Result<(), TimelineError> {
        let view = self.log.read().view();
        *self.loaded.write() = view;
        Ok(())
    }
}
