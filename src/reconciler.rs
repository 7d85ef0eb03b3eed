//! Classification of a commit instant against the metadata timeline.
//!
//! The metadata table allows several write attempts to share one instant id.
//! When the enclosing multi-table operation fails after the metadata write
//! succeeded, the retry arrives with an instant that is already completed
//! here; its completion record is removed so the retry applies as a new commit.

use crate::{
    error::{MetadataError, MetadataResult},
    instant::{Instant, InstantTime},
    timeline::{Timeline, TimelineError, TimelineView},
};

/// Verdict for an incoming instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// No completed instant with this time exists.
    New,
    /// A completed instant with this time exists and must be erased before re-application.
    RetryOfCompleted(Instant),
}

impl Reconciliation {
    /// Returns `true` for [`Reconciliation::New`].
    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self, Reconciliation::New)
    }
}

/// Classify `time` against `view` without touching the timeline.
#[must_use]
pub fn classify(view: &TimelineView, time: &InstantTime) -> Reconciliation {
    match view.completed_instant_at(time) {
        Some(instant) => Reconciliation::RetryOfCompleted(instant.clone()),
        None => Reconciliation::New,
    }
}

/// Classify `time` and, for a retry, erase the completed record and refresh the view.
pub async fn reconcile(
    timeline: &dyn Timeline,
    time: &InstantTime,
) -> MetadataResult<Reconciliation> {
    let view = timeline.view().await?;
    let verdict = classify(&view, time);
    if let Reconciliation::RetryOfCompleted(_) = &verdict {
        repair_completed(timeline, &view, time).await?;
    }
    Ok(verdict)
}

async fn repair_completed(
    timeline: &dyn Timeline,
    view: &TimelineView,
    time: &InstantTime,
) -> MetadataResult<()> {
    let Some(completed) = view.completed_instant_at(time) else {
        return Err(MetadataError::TimelineCorruption {
            instant: time.clone(),
        });
    };
    match timeline.delete_completed_instant(completed).await {
        Ok(()) => {}
        Err(TimelineError::NotFound(_)) => {
            return Err(MetadataError::TimelineCorruption {
                instant: time.clone(),
            });
        }
        Err(err) => return Err(err.into()),
    }
    timeline.refresh().await?;
    Ok(())
}
