//! Capability set of an execution engine that persists metadata records.
//!
//! The commit applier and the maintenance scheduler only depend on
//! [`WriteClient`]; engines are picked when the writer is constructed.

use async_trait::async_trait;
use thiserror::Error;

use crate::{instant::InstantTime, record::MetadataRecord};

/// Errors surfaced by a [`WriteClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// An instant is already completed and cannot be started or written again.
    #[error("instant {0} is already completed")]
    InstantCompleted(InstantTime),
    /// No compaction plan is scheduled at the given instant.
    #[error("no compaction scheduled at instant {0}")]
    CompactionNotScheduled(InstantTime),
    /// A worker task of a parallel engine failed.
    #[error("write worker failed: {0}")]
    Worker(String),
    /// Backend failure.
    #[error("write client backend error: {0}")]
    Backend(String),
}

/// Outcome of writing a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteStatus {
    record_key: String,
    error: Option<String>,
}

impl WriteStatus {
    /// Successful write of `record_key`.
    pub fn success(record_key: impl Into<String>) -> Self {
        Self {
            record_key: record_key.into(),
            error: None,
        }
    }

    /// Failed write of `record_key`.
    pub fn failure(record_key: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            record_key: record_key.into(),
            error: Some(error.into()),
        }
    }

    /// Key of the written record.
    #[must_use]
    pub fn record_key(&self) -> &str {
        &self.record_key
    }

    /// Error message, if the write failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns `true` when the write failed.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.error.is_some()
    }
}

/// Summary of one compaction run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// File groups that received a new base slice.
    pub file_groups_compacted: usize,
    /// Log blocks merged into base slices.
    pub log_blocks_merged: usize,
}

/// Summary of one clean run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanStats {
    /// Superseded file slices removed.
    pub file_slices_deleted: usize,
}

/// Engine that writes, compacts, and cleans the metadata table.
#[async_trait]
pub trait WriteClient: Send + Sync {
    /// Register `instant` as started before any data is written.
    async fn begin(&mut self, instant: &InstantTime) -> Result<(), ClientError>;

    /// Upsert routed records at `instant` and complete it when every record succeeds.
    ///
    /// Starts the instant implicitly when it was not registered. Statuses are
    /// returned only after every record write has finished.
    async fn upsert(
        &mut self,
        records: Vec<MetadataRecord>,
        instant: &InstantTime,
    ) -> Result<Vec<WriteStatus>, ClientError>;

    /// Schedule a compaction plan at `instant`; `false` when nothing was scheduled.
    async fn schedule_compaction(&mut self, instant: &InstantTime) -> Result<bool, ClientError>;

    /// Execute the compaction plan scheduled at `instant`.
    async fn compact(&mut self, instant: &InstantTime) -> Result<CompactionStats, ClientError>;

    /// Clean superseded file slices under `instant`.
    async fn clean(&mut self, instant: &InstantTime) -> Result<CleanStats, ClientError>;
}
