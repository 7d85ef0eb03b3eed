//! Commit orchestration for one metadata partition batch.
//!
//! A commit runs `route -> reconcile -> begin -> write -> verify -> finalize`
//! while holding the writer's client session. Maintenance runs only after the
//! batch is durably committed and never turns a successful commit into an
//! error.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{
    catalog::FileGroupCatalog,
    client::WriteClient,
    config::{ConfigError, MetadataWriterConfig},
    error::{MetadataError, MetadataResult},
    instant::InstantTime,
    logging::{WRITER_LOG_CTX, lakemeta_log},
    maintenance::{MaintenanceReport, MaintenanceScheduler},
    metrics::{MetadataMetrics, MetadataMetricsSnapshot},
    reconciler::{Reconciliation, reconcile},
    record::MetadataRecord,
    router::ShardRouter,
    timeline::Timeline,
};

/// File groups each partition is routed across on this write path.
pub const FILE_GROUPS_PER_PARTITION: usize = 1;

/// Failure raised while initializing the metadata table.
#[derive(Debug, Error)]
#[error("metadata table bootstrap failed: {0}")]
pub struct BootstrapError(String);

impl BootstrapError {
    /// Wrap a failure description.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// First-use initialization of the metadata table.
#[async_trait]
pub trait Bootstrap: Send + Sync {
    /// Create whatever the metadata table is missing.
    async fn bootstrap_if_needed(&self) -> Result<(), BootstrapError>;
}

/// External collaborators the writer reads from.
#[derive(Clone)]
pub struct Collaborators {
    /// File-group catalog of the metadata table.
    pub catalog: Arc<dyn FileGroupCatalog>,
    /// Timeline of the metadata table.
    pub metadata_timeline: Arc<dyn Timeline>,
    /// Timeline of the primary data table.
    pub data_timeline: Arc<dyn Timeline>,
}

/// Result of a successful commit.
#[derive(Debug)]
pub struct CommitReport {
    /// Committed instant.
    pub instant: InstantTime,
    /// Partition the batch was written to.
    pub partition: String,
    /// Records written.
    pub records_written: usize,
    /// Whether a completed instant was erased before re-applying.
    pub retried: bool,
    /// Post-commit compaction and clean results.
    pub maintenance: MaintenanceReport,
}

/// Applies record batches to the metadata table and keeps it maintained.
pub struct MetadataWriter<C> {
    config: MetadataWriterConfig,
    enabled: AtomicBool,
    client: Mutex<C>,
    collaborators: Collaborators,
    metrics: Option<MetadataMetrics>,
}

impl<C> MetadataWriter<C>
where
    C: WriteClient,
{
    /// Build a writer around the engine `client`.
    pub fn new(
        config: MetadataWriterConfig,
        client: C,
        collaborators: Collaborators,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let metrics = config.is_metrics_enabled().then(MetadataMetrics::default);
        Ok(Self {
            enabled: AtomicBool::new(config.is_enabled()),
            config,
            client: Mutex::new(client),
            collaborators,
            metrics,
        })
    }

    /// Whether commits are accepted.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Run first-use initialization; on failure the writer stays disabled for good.
    pub async fn initialize(&self, bootstrap: &dyn Bootstrap) {
        if !self.is_enabled() {
            return;
        }
        if let Err(err) = bootstrap.bootstrap_if_needed().await {
            lakemeta_log!(
                log::Level::Error,
                ctx: WRITER_LOG_CTX,
                "metadata_writer_disabled",
                "reason=bootstrap_failed error={}",
                err,
            );
            self.enabled.store(false, Ordering::Release);
        }
    }

    /// Current metrics, when enabled.
    pub fn metrics(&self) -> Option<MetadataMetricsSnapshot> {
        self.metrics.as_ref().map(MetadataMetrics::snapshot)
    }

    /// Apply `records` to `partition` as the commit `instant`.
    ///
    /// Re-invoking with an instant whose earlier attempt completed erases that
    /// completion and applies the batch again, leaving one completed instant.
    pub async fn commit_partition_batch(
        &self,
        records: Vec<MetadataRecord>,
        partition: &str,
        instant: &InstantTime,
    ) -> MetadataResult<CommitReport> {
        if !self.is_enabled() {
            return Err(MetadataError::NotEnabled);
        }

        let report = {
            let mut session = self.client.lock().await;
            self.apply(&mut *session, records, partition, instant).await
        };

        match report {
            Ok(report) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_commit(report.records_written);
                    self.update_size_metrics(metrics).await;
                }
                Ok(report)
            }
            Err(err) => {
                lakemeta_log!(
                    log::Level::Warn,
                    ctx: WRITER_LOG_CTX,
                    "metadata_commit_failed",
                    "instant={} partition={} error={}",
                    instant,
                    partition,
                    err,
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_commit_failure();
                }
                Err(err)
            }
        }
    }

    async fn apply(
        &self,
        client: &mut C,
        records: Vec<MetadataRecord>,
        partition: &str,
        instant: &InstantTime,
    ) -> MetadataResult<CommitReport> {
        lakemeta_log!(
            log::Level::Debug,
            ctx: WRITER_LOG_CTX,
            "metadata_commit_started",
            "instant={} partition={} records={}",
            instant,
            partition,
            records.len(),
        );
        let routed = ShardRouter::new(self.collaborators.catalog.as_ref())
            .route(records, partition, FILE_GROUPS_PER_PARTITION)
            .await?;

        let metadata_timeline = self.collaborators.metadata_timeline.as_ref();
        let verdict = reconcile(metadata_timeline, instant).await?;
        match &verdict {
            Reconciliation::New => client.begin(instant).await?,
            Reconciliation::RetryOfCompleted(erased) => {
                lakemeta_log!(
                    log::Level::Info,
                    ctx: WRITER_LOG_CTX,
                    "metadata_commit_retry_repaired",
                    "instant={} erased={}",
                    instant,
                    erased,
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_retry_repaired();
                }
            }
        }

        let records_written = routed.len();
        let statuses = client.upsert(routed, instant).await?;
        let failed_records = statuses.iter().filter(|status| status.has_errors()).count();
        if failed_records > 0 {
            return Err(MetadataError::CommitFailed {
                instant: instant.clone(),
                failed_records,
            });
        }

        metadata_timeline.refresh().await?;
        lakemeta_log!(
            log::Level::Info,
            ctx: WRITER_LOG_CTX,
            "metadata_commit_completed",
            "instant={} partition={} records={}",
            instant,
            partition,
            records_written,
        );

        let maintenance = MaintenanceScheduler::new(
            self.config.compaction_suffix_ref(),
            self.config.clean_suffix_ref(),
        )
        .with_metrics(self.metrics.as_ref())
        .run(
            client,
            metadata_timeline,
            self.collaborators.data_timeline.as_ref(),
            instant,
        )
        .await;

        Ok(CommitReport {
            instant: instant.clone(),
            partition: partition.to_string(),
            records_written,
            retried: !verdict.is_new(),
            maintenance,
        })
    }

    async fn update_size_metrics(&self, metrics: &MetadataMetrics) {
        match self.collaborators.catalog.table_stats().await {
            Ok(stats) => metrics.update_size(stats),
            Err(err) => lakemeta_log!(
                log::Level::Warn,
                ctx: WRITER_LOG_CTX,
                "metadata_size_metrics_failed",
                "error={}",
                err,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::{ClientError, CleanStats, CompactionStats, WriteStatus},
        config::MemTableOptions,
        engine::LocalEngine,
        instant::{Instant, InstantAction, InstantState},
        maintenance::{CompactionOutcome, MaintenanceError},
        mem::{MemBootstrap, MemTable, MemTimeline},
    };

    struct Harness {
        table: MemTable,
        metadata: MemTimeline,
        data: MemTimeline,
    }

    impl Harness {
        fn new() -> Self {
            let table = MemTable::new(MemTableOptions::default()).expect("table");
            table.add_partition("files", 1);
            let metadata = table.timeline();
            Self {
                table,
                metadata,
                data: MemTimeline::new(),
            }
        }

        fn collaborators(&self) -> Collaborators {
            Collaborators {
                catalog: Arc::new(self.table.clone()),
                metadata_timeline: Arc::new(self.metadata.clone()),
                data_timeline: Arc::new(self.data.clone()),
            }
        }

        fn writer<C: WriteClient>(&self, client: C) -> MetadataWriter<C> {
            MetadataWriter::new(MetadataWriterConfig::default(), client, self.collaborators())
                .expect("writer")
        }
    }

    fn time(raw: &str) -> InstantTime {
        InstantTime::parse(raw).expect("time")
    }

    fn batch(pairs: &[(&str, &str)]) -> Vec<MetadataRecord> {
        pairs
            .iter()
            .map(|(key, value)| MetadataRecord::new(*key, "files", value.as_bytes().to_vec()))
            .collect()
    }

    /// Wraps an engine and fails selected maintenance calls.
    struct FlakyMaintenance<C> {
        inner: C,
        fail_compaction: bool,
        fail_clean: bool,
    }

    #[async_trait]
    impl<C: WriteClient> WriteClient for FlakyMaintenance<C> {
        async fn begin(&mut self, instant: &InstantTime) -> Result<(), ClientError> {
            self.inner.begin(instant).await
        }

        async fn upsert(
            &mut self,
            records: Vec<MetadataRecord>,
            instant: &InstantTime,
        ) -> Result<Vec<WriteStatus>, ClientError> {
            self.inner.upsert(records, instant).await
        }

        async fn schedule_compaction(&mut self, instant: &InstantTime) -> Result<bool, ClientError> {
            self.inner.schedule_compaction(instant).await
        }

        async fn compact(&mut self, instant: &InstantTime) -> Result<CompactionStats, ClientError> {
            if self.fail_compaction {
                return Err(ClientError::Backend("compaction exploded".to_string()));
            }
            self.inner.compact(instant).await
        }

        async fn clean(&mut self, instant: &InstantTime) -> Result<CleanStats, ClientError> {
            if self.fail_clean {
                return Err(ClientError::Backend("clean exploded".to_string()));
            }
            self.inner.clean(instant).await
        }
    }

    #[tokio::test]
    async fn disabled_writer_rejects_commits() {
        let harness = Harness::new();
        let writer = MetadataWriter::new(
            MetadataWriterConfig::default().enabled(false),
            LocalEngine::new(harness.table.clone()),
            harness.collaborators(),
        )
        .expect("writer");
        assert!(!writer.is_enabled());
        let err = writer
            .commit_partition_batch(batch(&[("a", "1")]), "files", &time("1"))
            .await
            .expect_err("disabled");
        assert!(matches!(err, MetadataError::NotEnabled));
    }

    #[tokio::test]
    async fn bootstrap_failure_disables_permanently() {
        let harness = Harness::new();
        let writer = harness.writer(LocalEngine::new(harness.table.clone()));
        writer
            .initialize(&MemBootstrap::new(harness.table.clone(), [""]))
            .await;
        assert!(!writer.is_enabled());

        // A later successful bootstrap does not re-enable the writer.
        writer
            .initialize(&MemBootstrap::new(harness.table.clone(), ["files"]))
            .await;
        assert!(!writer.is_enabled());
        let err = writer
            .commit_partition_batch(batch(&[("a", "1")]), "files", &time("1"))
            .await
            .expect_err("disabled");
        assert!(matches!(err, MetadataError::NotEnabled));
    }

    #[tokio::test]
    async fn maintenance_failures_do_not_fail_the_commit() {
        let harness = Harness::new();
        let writer = harness.writer(FlakyMaintenance {
            inner: LocalEngine::new(harness.table.clone()),
            fail_compaction: true,
            fail_clean: true,
        });

        let report = writer
            .commit_partition_batch(batch(&[("a", "1")]), "files", &time("20230101000000"))
            .await
            .expect("commit succeeds");
        assert!(matches!(
            report.maintenance.compaction,
            Err(MaintenanceError::Client(_))
        ));
        assert!(report.maintenance.clean.is_err());
        assert!(
            harness
                .metadata
                .durable_view()
                .contains_completed(&time("20230101000000"))
        );
        assert_eq!(harness.table.read("files", "a"), Some(b"1".to_vec()));

        let metrics = writer.metrics().expect("metrics");
        assert_eq!(metrics.commits, 1);
        assert_eq!(metrics.maintenance_failures, 2);
    }

    #[tokio::test]
    async fn failed_attempt_can_be_retried_with_the_same_instant() {
        let harness = Harness::new();
        let writer = harness.writer(LocalEngine::new(harness.table.clone()));
        harness.table.inject_write_failure("b");

        let err = writer
            .commit_partition_batch(batch(&[("a", "1"), ("b", "1")]), "files", &time("5"))
            .await
            .expect_err("write failure");
        assert!(matches!(
            err,
            MetadataError::CommitFailed {
                failed_records: 1,
                ..
            }
        ));
        assert!(harness.metadata.durable_view().completed().next().is_none());

        harness.table.clear_write_failures();
        let report = writer
            .commit_partition_batch(batch(&[("a", "2"), ("b", "2")]), "files", &time("5"))
            .await
            .expect("retry");
        assert!(!report.retried);
        assert_eq!(harness.table.read("files", "b"), Some(b"2".to_vec()));
        let metrics = writer.metrics().expect("metrics");
        assert_eq!(metrics.commit_failures, 1);
        assert_eq!(metrics.commits, 1);
    }

    #[tokio::test]
    async fn pending_data_instant_blocks_compaction_but_not_clean() {
        let harness = Harness::new();
        harness
            .data
            .record(&Instant::new(
                time("20230101000000"),
                InstantAction::Commit,
                InstantState::Inflight,
            ))
            .expect("record");
        let writer = harness.writer(LocalEngine::new(harness.table.clone()));

        let report = writer
            .commit_partition_batch(batch(&[("a", "1")]), "files", &time("20230102000000"))
            .await
            .expect("commit");
        assert!(matches!(
            report.maintenance.compaction,
            Ok(CompactionOutcome::Skipped { .. })
        ));
        let clean = report.maintenance.clean.expect("clean");
        assert_eq!(clean.instant, time("20230102000000002"));
        let view = harness.metadata.durable_view();
        assert!(view.any_at(&time("20230102000000001")).is_none());
    }
}
