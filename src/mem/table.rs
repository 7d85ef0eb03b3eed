//! In-memory metadata table: partitions of file groups made of file slices.
//!
//! Each file slice has an optional base snapshot plus log blocks tagged with
//! the instant that wrote them. Readers only see log blocks whose instant is a
//! completed delta commit, so an attempt that never completed stays invisible.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    catalog::{CatalogError, FileGroup, FileGroupCatalog, FileGroupId, TableStats},
    client::{ClientError, CleanStats, CompactionStats, WriteStatus},
    config::{ConfigError, MemTableOptions},
    instant::{InstantAction, InstantState, InstantTime},
    mem::timeline::{InstantLog, MemTimeline},
    record::MetadataRecord,
    timeline::TimelineError,
};

type Rows = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Clone)]
struct LogBlock {
    instant: InstantTime,
    rows: Rows,
}

#[derive(Debug, Clone)]
struct FileSlice {
    base_instant: InstantTime,
    base: Option<Rows>,
    logs: Vec<LogBlock>,
}

impl FileSlice {
    fn empty(base_instant: InstantTime) -> Self {
        Self {
            base_instant,
            base: None,
            logs: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct FileGroupState {
    id: FileGroupId,
    // Oldest first; the last slice is the latest.
    slices: Vec<FileSlice>,
}

impl FileGroupState {
    fn latest(&self) -> Option<&FileSlice> {
        self.slices.last()
    }

    fn latest_mut(&mut self) -> Option<&mut FileSlice> {
        self.slices.last_mut()
    }
}

#[derive(Debug, Default)]
struct TableState {
    partitions: BTreeMap<String, Vec<FileGroupState>>,
    failing_keys: HashSet<String>,
}

/// Shared handle to an in-memory metadata table.
#[derive(Debug, Clone)]
pub struct MemTable {
    state: Arc<RwLock<TableState>>,
    log: Arc<RwLock<InstantLog>>,
    options: MemTableOptions,
}

impl MemTable {
    /// Create an empty table.
    pub fn new(options: MemTableOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            state: Arc::new(RwLock::new(TableState::default())),
            log: Arc::new(RwLock::new(InstantLog::default())),
            options,
        })
    }

    /// Options the table was created with.
    #[must_use]
    pub fn options(&self) -> MemTableOptions {
        self.options
    }

    /// New timeline handle over this table's instants.
    #[must_use]
    pub fn timeline(&self) -> MemTimeline {
        MemTimeline::over(Arc::clone(&self.log))
    }

    /// Create `partition` with `file_groups` empty file groups based at the init instant.
    ///
    /// Returns `false` when the partition already exists.
    pub fn add_partition(&self, partition: &str, file_groups: usize) -> bool {
        let mut state = self.state.write();
        if state.partitions.contains_key(partition) {
            return false;
        }
        let groups = (0..file_groups)
            .map(|index| FileGroupState {
                id: FileGroupId::generate(partition, index),
                slices: vec![FileSlice::empty(InstantTime::init())],
            })
            .collect();
        state.partitions.insert(partition.to_string(), groups);
        true
    }

    /// Whether `partition` exists.
    #[must_use]
    pub fn has_partition(&self, partition: &str) -> bool {
        self.state.read().partitions.contains_key(partition)
    }

    /// Make writes of `key` report an error until cleared.
    pub fn inject_write_failure(&self, key: impl Into<String>) {
        self.state.write().failing_keys.insert(key.into());
    }

    /// Remove all injected write failures.
    pub fn clear_write_failures(&self) {
        self.state.write().failing_keys.clear();
    }

    /// Committed contents of `partition`, merged across base and visible logs.
    #[must_use]
    pub fn records(&self, partition: &str) -> Rows {
        // Lock order is always instants before file groups.
        let log = self.log.read();
        let state = self.state.read();
        let mut merged = Rows::new();
        if let Some(groups) = state.partitions.get(partition) {
            for group in groups {
                if let Some(slice) = group.latest() {
                    merged.extend(merge_slice(slice, &log));
                }
            }
        }
        merged
    }

    /// Committed value of `key` in `partition`.
    #[must_use]
    pub fn read(&self, partition: &str, key: &str) -> Option<Vec<u8>> {
        self.records(partition).remove(key)
    }

    /// Number of file slices held by each file group of `partition`.
    #[must_use]
    pub fn slice_counts(&self, partition: &str) -> Vec<usize> {
        self.state
            .read()
            .partitions
            .get(partition)
            .map(|groups| groups.iter().map(|group| group.slices.len()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn begin(&self, instant: &InstantTime) -> Result<(), ClientError> {
        let mut log = self.log.write();
        match log.state_of(instant, InstantAction::DeltaCommit) {
            Some(InstantState::Completed) => {
                return Err(ClientError::InstantCompleted(instant.clone()));
            }
            Some(_) => {}
            None => log
                .transition(instant, InstantAction::DeltaCommit, InstantState::Requested)
                .map_err(timeline_to_client)?,
        }
        log.transition(instant, InstantAction::DeltaCommit, InstantState::Inflight)
            .map_err(timeline_to_client)
    }

    /// Start (or restart) a delta commit, discarding blocks left by earlier attempts.
    pub(crate) fn prepare_upsert(&self, instant: &InstantTime) -> Result<(), ClientError> {
        {
            let mut log = self.log.write();
            if log.is_completed_delta(instant) {
                return Err(ClientError::InstantCompleted(instant.clone()));
            }
            log.transition(instant, InstantAction::DeltaCommit, InstantState::Inflight)
                .map_err(timeline_to_client)?;
        }
        let mut state = self.state.write();
        for group in state.partitions.values_mut().flatten() {
            for slice in &mut group.slices {
                slice.logs.retain(|block| &block.instant != instant);
            }
        }
        Ok(())
    }

    pub(crate) fn write_record(&self, record: &MetadataRecord, instant: &InstantTime) -> WriteStatus {
        let mut state = self.state.write();
        if state.failing_keys.contains(record.key()) {
            return WriteStatus::failure(record.key(), "injected write failure");
        }
        let Some(location) = record.location() else {
            return WriteStatus::failure(record.key(), "record was not routed");
        };
        let slice = state
            .partitions
            .get_mut(record.partition())
            .and_then(|groups| {
                groups
                    .iter_mut()
                    .find(|group| group.id == location.file_group_id)
            })
            .and_then(FileGroupState::latest_mut);
        let Some(slice) = slice else {
            return WriteStatus::failure(
                record.key(),
                format!("unknown file group {}", location.file_group_id),
            );
        };

        let index = match slice.logs.iter().position(|block| &block.instant == instant) {
            Some(index) => index,
            None => {
                slice.logs.push(LogBlock {
                    instant: instant.clone(),
                    rows: Rows::new(),
                });
                slice.logs.len() - 1
            }
        };
        slice.logs[index]
            .rows
            .insert(record.key().to_string(), record.payload().to_vec());
        WriteStatus::success(record.key())
    }

    /// Complete the delta commit when every status succeeded.
    pub(crate) fn finish_upsert(
        &self,
        instant: &InstantTime,
        statuses: &[WriteStatus],
    ) -> Result<(), ClientError> {
        if statuses.iter().any(WriteStatus::has_errors) {
            return Ok(());
        }
        self.log
            .write()
            .transition(instant, InstantAction::DeltaCommit, InstantState::Completed)
            .map_err(timeline_to_client)
    }

    pub(crate) fn schedule_compaction(&self, instant: &InstantTime) -> Result<bool, ClientError> {
        let mut log = self.log.write();
        if log.contains_time(instant) {
            return Ok(false);
        }
        let view = log.view();
        let since = view
            .last_completed_of(InstantAction::Compaction)
            .map(|compaction| compaction.time().clone())
            .unwrap_or_else(InstantTime::init);
        let deltas = view
            .completed_after(InstantAction::DeltaCommit, &since)
            .filter(|delta| delta.time() < instant)
            .count();
        if deltas < self.options.compaction_threshold() {
            return Ok(false);
        }
        log.transition(instant, InstantAction::Compaction, InstantState::Requested)
            .map_err(timeline_to_client)?;
        Ok(true)
    }

    pub(crate) fn compact(&self, instant: &InstantTime) -> Result<CompactionStats, ClientError> {
        let mut log = self.log.write();
        match log.state_of(instant, InstantAction::Compaction) {
            Some(InstantState::Requested) | Some(InstantState::Inflight) => {}
            _ => return Err(ClientError::CompactionNotScheduled(instant.clone())),
        }
        log.transition(instant, InstantAction::Compaction, InstantState::Inflight)
            .map_err(timeline_to_client)?;

        let mut stats = CompactionStats::default();
        let mut state = self.state.write();
        for group in state.partitions.values_mut().flatten() {
            let Some(latest) = group.latest() else {
                continue;
            };
            let (committed, pending): (Vec<&LogBlock>, Vec<&LogBlock>) = latest
                .logs
                .iter()
                .partition(|block| log.is_completed_delta(&block.instant));
            if committed.is_empty() {
                continue;
            }
            let mut base = latest.base.clone().unwrap_or_default();
            let mut ordered = committed;
            ordered.sort_by(|a, b| a.instant.cmp(&b.instant));
            for block in &ordered {
                base.extend(block.rows.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            stats.log_blocks_merged += ordered.len();
            stats.file_groups_compacted += 1;
            let carried: Vec<LogBlock> = pending.into_iter().cloned().collect();
            group.slices.push(FileSlice {
                base_instant: instant.clone(),
                base: Some(base),
                logs: carried,
            });
        }

        log.transition(instant, InstantAction::Compaction, InstantState::Completed)
            .map_err(timeline_to_client)?;
        Ok(stats)
    }

    pub(crate) fn clean(&self, instant: &InstantTime) -> Result<CleanStats, ClientError> {
        let mut log = self.log.write();
        // A retried commit derives the same clean instant; the earlier run already cleaned.
        if log.state_of(instant, InstantAction::Clean) == Some(InstantState::Completed) {
            return Ok(CleanStats::default());
        }
        log.transition(instant, InstantAction::Clean, InstantState::Inflight)
            .map_err(timeline_to_client)?;

        let retained = self.options.retained_versions();
        let mut stats = CleanStats::default();
        let mut state = self.state.write();
        for group in state.partitions.values_mut().flatten() {
            if group.slices.len() > retained {
                let excess = group.slices.len() - retained;
                group.slices.drain(..excess);
                stats.file_slices_deleted += excess;
            }
        }

        log.transition(instant, InstantAction::Clean, InstantState::Completed)
            .map_err(timeline_to_client)?;
        Ok(stats)
    }
}

fn merge_slice(slice: &FileSlice, log: &InstantLog) -> Rows {
    let mut merged = slice.base.clone().unwrap_or_default();
    let mut visible: Vec<&LogBlock> = slice
        .logs
        .iter()
        .filter(|block| log.is_completed_delta(&block.instant))
        .collect();
    visible.sort_by(|a, b| a.instant.cmp(&b.instant));
    for block in visible {
        merged.extend(block.rows.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

fn rows_bytes(rows: &Rows) -> u64 {
    rows.iter()
        .map(|(key, value)| (key.len() + value.len()) as u64)
        .sum()
}

fn timeline_to_client(err: TimelineError) -> ClientError {
    ClientError::Backend(err.to_string())
}

#[async_trait]
impl FileGroupCatalog for MemTable {
    async fn file_groups_for_partition(
        &self,
        partition: &str,
    ) -> Result<Vec<FileGroup>, CatalogError> {
        let state = self.state.read();
        let groups = state
            .partitions
            .get(partition)
            .ok_or_else(|| CatalogError::UnknownPartition(partition.to_string()))?;
        let mut listed: Vec<FileGroup> = groups
            .iter()
            .filter_map(|group| {
                group
                    .latest()
                    .map(|slice| FileGroup::new(group.id.clone(), slice.base_instant.clone()))
            })
            .collect();
        listed.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(listed)
    }

    async fn table_stats(&self) -> Result<TableStats, CatalogError> {
        let state = self.state.read();
        let mut stats = TableStats::default();
        for group in state.partitions.values().flatten() {
            for slice in &group.slices {
                if let Some(base) = &slice.base {
                    stats.base_file_count += 1;
                    stats.total_base_bytes += rows_bytes(base);
                }
                stats.log_file_count += slice.logs.len() as u64;
                stats.total_log_bytes += slice.logs.iter().map(|b| rows_bytes(&b.rows)).sum::<u64>();
            }
        }
        Ok(stats)
    }
}
