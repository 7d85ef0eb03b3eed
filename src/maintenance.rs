//! Post-commit compaction and cleaning of the metadata table.
//!
//! Compaction of the metadata table at time T must reflect every data-table
//! action up to T, so it only runs when no data-table instant before the
//! latest metadata delta commit is still requested or inflight. Maintenance
//! instants are derived from existing instants with fixed suffixes and never
//! collide with each other or with organically generated instants.

use thiserror::Error;

use crate::{
    client::{ClientError, CleanStats, CompactionStats, WriteClient},
    instant::{Instant, InstantAction, InstantSuffix, InstantTime},
    logging::{MAINTENANCE_LOG_CTX, lakemeta_log},
    metrics::MetadataMetrics,
    timeline::{Timeline, TimelineError},
};

/// Failure of a maintenance step. Never fails the commit that triggered it.
#[derive(Debug, Error)]
pub enum MaintenanceError {
    /// The metadata timeline has no completed delta commit to compact after.
    #[error("no completed delta commit on the metadata timeline")]
    NoCompletedDeltaCommit,
    /// Timeline collaborator failure.
    #[error("maintenance timeline error: {0}")]
    Timeline(#[from] TimelineError),
    /// Write-client collaborator failure.
    #[error("maintenance write client error: {0}")]
    Client(#[from] ClientError),
}

/// Result of the compaction decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Earlier data-table instants are still pending.
    Skipped {
        /// Latest completed metadata delta commit.
        latest_delta: InstantTime,
        /// Pending data-table instants before `latest_delta`.
        pending: Vec<Instant>,
    },
    /// The write client declined to schedule a plan at `instant`.
    NotScheduled {
        /// Derived compaction instant.
        instant: InstantTime,
    },
    /// A plan was scheduled and executed at `instant`.
    Completed {
        /// Derived compaction instant.
        instant: InstantTime,
        /// Work performed.
        stats: CompactionStats,
    },
}

/// Result of a clean run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanOutcome {
    /// Derived clean instant.
    pub instant: InstantTime,
    /// Work performed.
    pub stats: CleanStats,
}

/// Compaction and clean results of one commit.
#[derive(Debug)]
pub struct MaintenanceReport {
    /// Compaction decision or failure.
    pub compaction: Result<CompactionOutcome, MaintenanceError>,
    /// Clean result or failure.
    pub clean: Result<CleanOutcome, MaintenanceError>,
}

impl MaintenanceReport {
    /// Returns `true` when neither step failed.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.compaction.is_ok() && self.clean.is_ok()
    }
}

/// Derives maintenance instants and drives compaction and cleaning.
pub struct MaintenanceScheduler<'a> {
    compaction_suffix: &'a InstantSuffix,
    clean_suffix: &'a InstantSuffix,
    metrics: Option<&'a MetadataMetrics>,
}

impl<'a> MaintenanceScheduler<'a> {
    /// Build a scheduler using the given suffixes.
    pub fn new(compaction_suffix: &'a InstantSuffix, clean_suffix: &'a InstantSuffix) -> Self {
        Self {
            compaction_suffix,
            clean_suffix,
            metrics: None,
        }
    }

    /// Record outcomes into `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Option<&'a MetadataMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Compaction instant derived from a delta commit instant.
    #[must_use]
    pub fn compaction_instant(&self, latest_delta: &InstantTime) -> InstantTime {
        latest_delta.with_suffix(self.compaction_suffix)
    }

    /// Clean instant derived from a commit instant.
    #[must_use]
    pub fn clean_instant(&self, commit: &InstantTime) -> InstantTime {
        commit.with_suffix(self.clean_suffix)
    }

    /// Compact, then clean. Failures are logged and returned in the report.
    pub async fn run<C>(
        &self,
        client: &mut C,
        metadata: &dyn Timeline,
        data: &dyn Timeline,
        commit: &InstantTime,
    ) -> MaintenanceReport
    where
        C: WriteClient + ?Sized,
    {
        let compaction = self.maybe_compact(client, metadata, data).await;
        if let Err(err) = &compaction {
            self.report_failure("compaction", commit, err);
        }
        let clean = self.clean(client, commit).await;
        if let Err(err) = &clean {
            self.report_failure("clean", commit, err);
        }
        MaintenanceReport { compaction, clean }
    }

    /// Compact the metadata table unless earlier data-table instants are pending.
    pub async fn maybe_compact<C>(
        &self,
        client: &mut C,
        metadata: &dyn Timeline,
        data: &dyn Timeline,
    ) -> Result<CompactionOutcome, MaintenanceError>
    where
        C: WriteClient + ?Sized,
    {
        let latest_delta = metadata
            .last_completed_instant(InstantAction::DeltaCommit)
            .await?
            .ok_or(MaintenanceError::NoCompletedDeltaCommit)?
            .time()
            .clone();

        data.refresh().await?;
        let data_view = data.view().await?;
        let pending: Vec<Instant> = data_view.pending_before(&latest_delta).cloned().collect();
        if !pending.is_empty() {
            lakemeta_log!(
                log::Level::Info,
                ctx: MAINTENANCE_LOG_CTX,
                "metadata_compaction_skipped",
                "latest_delta={} pending_count={} pending={}",
                latest_delta,
                pending.len(),
                display_instants(&pending),
            );
            if let Some(metrics) = self.metrics {
                metrics.record_compaction_skipped();
            }
            return Ok(CompactionOutcome::Skipped {
                latest_delta,
                pending,
            });
        }

        let instant = self.compaction_instant(&latest_delta);
        if !client.schedule_compaction(&instant).await? {
            lakemeta_log!(
                log::Level::Debug,
                ctx: MAINTENANCE_LOG_CTX,
                "metadata_compaction_not_scheduled",
                "instant={}",
                instant,
            );
            return Ok(CompactionOutcome::NotScheduled { instant });
        }

        let stats = client.compact(&instant).await?;
        lakemeta_log!(
            log::Level::Info,
            ctx: MAINTENANCE_LOG_CTX,
            "metadata_compaction_completed",
            "instant={} file_groups={} log_blocks={}",
            instant,
            stats.file_groups_compacted,
            stats.log_blocks_merged,
        );
        if let Some(metrics) = self.metrics {
            metrics.record_compaction();
        }
        Ok(CompactionOutcome::Completed { instant, stats })
    }

    /// Clean superseded file slices under the instant derived from `commit`.
    pub async fn clean<C>(
        &self,
        client: &mut C,
        commit: &InstantTime,
    ) -> Result<CleanOutcome, MaintenanceError>
    where
        C: WriteClient + ?Sized,
    {
        let instant = self.clean_instant(commit);
        let stats = client.clean(&instant).await?;
        lakemeta_log!(
            log::Level::Info,
            ctx: MAINTENANCE_LOG_CTX,
            "metadata_clean_completed",
            "instant={} deleted_slices={}",
            instant,
            stats.file_slices_deleted,
        );
        if let Some(metrics) = self.metrics {
            metrics.record_clean();
        }
        Ok(CleanOutcome { instant, stats })
    }

    fn report_failure(&self, step: &str, commit: &InstantTime, err: &MaintenanceError) {
        lakemeta_log!(
            log::Level::Warn,
            ctx: MAINTENANCE_LOG_CTX,
            "metadata_maintenance_failed",
            "step={} commit={} error={}",
            step,
            commit,
            err,
        );
        if let Some(metrics) = self.metrics {
            metrics.record_maintenance_failure();
        }
    }
}

fn display_instants(instants: &[Instant]) -> String {
    let parts: Vec<String> = instants.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(","))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::{
        client::WriteStatus, instant::InstantState, record::MetadataRecord, timeline::TimelineView,
    };

    struct FixedTimeline {
        instants: Vec<Instant>,
        refreshes: Mutex<usize>,
    }

    impl FixedTimeline {
        fn new(instants: Vec<Instant>) -> Self {
            Self {
                instants,
                refreshes: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl Timeline for FixedTimeline {
        async fn view(&self) -> Result<TimelineView, TimelineError> {
            Ok(TimelineView::new(self.instants.clone()))
        }

        async fn delete_completed_instant(&self, instant: &Instant) -> Result<(), TimelineError> {
            Err(TimelineError::NotFound(instant.clone()))
        }

        async fn refresh(&self) -> Result<(), TimelineError> {
            *self.refreshes.lock() += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingClient {
        scheduled: Vec<InstantTime>,
        compacted: Vec<InstantTime>,
        cleaned: Vec<InstantTime>,
        decline_schedule: bool,
        fail_compaction: bool,
    }

    #[async_trait]
    impl WriteClient for RecordingClient {
        async fn begin(&mut self, _instant: &InstantTime) -> Result<(), ClientError> {
            Ok(())
        }

        async fn upsert(
            &mut self,
            records: Vec<MetadataRecord>,
            _instant: &InstantTime,
        ) -> Result<Vec<WriteStatus>, ClientError> {
            Ok(records
                .iter()
                .map(|record| WriteStatus::success(record.key()))
                .collect())
        }

        async fn schedule_compaction(&mut self, instant: &InstantTime) -> Result<bool, ClientError> {
            self.scheduled.push(instant.clone());
            Ok(!self.decline_schedule)
        }

        async fn compact(&mut self, instant: &InstantTime) -> Result<CompactionStats, ClientError> {
            if self.fail_compaction {
                return Err(ClientError::Backend("disk full".to_string()));
            }
            self.compacted.push(instant.clone());
            Ok(CompactionStats::default())
        }

        async fn clean(&mut self, instant: &InstantTime) -> Result<CleanStats, ClientError> {
            self.cleaned.push(instant.clone());
            Ok(CleanStats::default())
        }
    }

    fn time(raw: &str) -> InstantTime {
        InstantTime::parse(raw).expect("time")
    }

    fn delta(raw: &str) -> Instant {
        Instant::new(time(raw), InstantAction::DeltaCommit, InstantState::Completed)
    }

    #[tokio::test]
    async fn compacts_after_latest_delta_when_nothing_is_pending() {
        let (compaction, clean) = (InstantSuffix::compaction(), InstantSuffix::clean());
        let scheduler = MaintenanceScheduler::new(&compaction, &clean);
        let metadata = FixedTimeline::new(vec![delta("20230101000000"), delta("20230102000000")]);
        let data = FixedTimeline::new(vec![Instant::new(
            time("20230103000000"),
            InstantAction::Commit,
            InstantState::Inflight,
        )]);
        let mut client = RecordingClient::default();

        let report = scheduler
            .run(&mut client, &metadata, &data, &time("20230101000000"))
            .await;
        assert!(report.is_ok());
        assert_eq!(client.compacted, vec![time("20230102000000001")]);
        assert_eq!(client.cleaned, vec![time("20230101000000002")]);
        assert_eq!(*data.refreshes.lock(), 1);
    }

    #[tokio::test]
    async fn pending_earlier_data_instant_skips_compaction() {
        let (compaction, clean) = (InstantSuffix::compaction(), InstantSuffix::clean());
        let metrics = MetadataMetrics::default();
        let scheduler = MaintenanceScheduler::new(&compaction, &clean).with_metrics(Some(&metrics));
        let metadata = FixedTimeline::new(vec![delta("20230102000000")]);
        let pending = Instant::new(
            time("20230101000000"),
            InstantAction::Commit,
            InstantState::Requested,
        );
        let data = FixedTimeline::new(vec![pending.clone()]);
        let mut client = RecordingClient::default();

        let outcome = scheduler
            .maybe_compact(&mut client, &metadata, &data)
            .await
            .expect("decision");
        assert_eq!(
            outcome,
            CompactionOutcome::Skipped {
                latest_delta: time("20230102000000"),
                pending: vec![pending],
            }
        );
        assert!(client.scheduled.is_empty());
        assert_eq!(metrics.snapshot().compactions_skipped, 1);
    }

    #[tokio::test]
    async fn declined_plan_is_not_executed() {
        let (compaction, clean) = (InstantSuffix::compaction(), InstantSuffix::clean());
        let scheduler = MaintenanceScheduler::new(&compaction, &clean);
        let metadata = FixedTimeline::new(vec![delta("5")]);
        let data = FixedTimeline::new(Vec::new());
        let mut client = RecordingClient {
            decline_schedule: true,
            ..RecordingClient::default()
        };

        let outcome = scheduler
            .maybe_compact(&mut client, &metadata, &data)
            .await
            .expect("decision");
        assert_eq!(outcome, CompactionOutcome::NotScheduled { instant: time("5001") });
        assert!(client.compacted.is_empty());
    }

    #[tokio::test]
    async fn compaction_failure_still_cleans() {
        let (compaction, clean) = (InstantSuffix::compaction(), InstantSuffix::clean());
        let metrics = MetadataMetrics::default();
        let scheduler = MaintenanceScheduler::new(&compaction, &clean).with_metrics(Some(&metrics));
        let metadata = FixedTimeline::new(vec![delta("5")]);
        let data = FixedTimeline::new(Vec::new());
        let mut client = RecordingClient {
            fail_compaction: true,
            ..RecordingClient::default()
        };

        let report = scheduler.run(&mut client, &metadata, &data, &time("5")).await;
        assert!(matches!(
            report.compaction,
            Err(MaintenanceError::Client(ClientError::Backend(_)))
        ));
        assert!(report.clean.is_ok());
        assert_eq!(client.cleaned, vec![time("5002")]);
        assert_eq!(metrics.snapshot().maintenance_failures, 1);
    }

    #[tokio::test]
    async fn empty_metadata_timeline_is_reported() {
        let (compaction, clean) = (InstantSuffix::compaction(), InstantSuffix::clean());
        let scheduler = MaintenanceScheduler::new(&compaction, &clean);
        let metadata = FixedTimeline::new(Vec::new());
        let data = FixedTimeline::new(Vec::new());
        let mut client = RecordingClient::default();

        let err = scheduler
            .maybe_compact(&mut client, &metadata, &data)
            .await
            .expect_err("no delta");
        assert!(matches!(err, MaintenanceError::NoCompletedDeltaCommit));
    }
}
