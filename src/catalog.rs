//! File groups and the catalog that lists them per metadata partition.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use crate::instant::InstantTime;

/// Errors surfaced by a [`FileGroupCatalog`].
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The partition has never been initialized.
    #[error("unknown metadata partition `{0}`")]
    UnknownPartition(String),
    /// Backend failure while listing file groups.
    #[error("catalog backend error: {0}")]
    Backend(String),
}

/// Stable identifier of a file group.
///
/// Identifiers are `<partition>-<index>-<ulid>` with a zero-padded index, so
/// sorting identifiers preserves the index order of a partition's file groups.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileGroupId(String);

impl FileGroupId {
    /// Allocate a fresh identifier for the file group at `index` of `partition`.
    #[must_use]
    pub fn generate(partition: &str, index: usize) -> Self {
        Self(format!("{partition}-{index:04}-{}", Ulid::new()))
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for FileGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FileGroupId").field(&self.0).finish()
    }
}

/// A physical shard of a partition, as seen through its latest file slice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileGroup {
    id: FileGroupId,
    base_instant: InstantTime,
}

impl FileGroup {
    /// Describe a file group whose latest slice is based at `base_instant`.
    #[must_use]
    pub fn new(id: FileGroupId, base_instant: InstantTime) -> Self {
        Self { id, base_instant }
    }

    /// File group identifier.
    #[must_use]
    pub fn id(&self) -> &FileGroupId {
        &self.id
    }

    /// Base instant of the latest file slice.
    #[must_use]
    pub fn base_instant(&self) -> &InstantTime {
        &self.base_instant
    }
}

/// Size and file counts of the whole metadata table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TableStats {
    /// Number of live base files.
    pub base_file_count: u64,
    /// Number of live log blocks.
    pub log_file_count: u64,
    /// Bytes held in base files.
    pub total_base_bytes: u64,
    /// Bytes held in log blocks.
    pub total_log_bytes: u64,
}

/// Read access to the file groups of the metadata table.
#[async_trait]
pub trait FileGroupCatalog: Send + Sync {
    /// File groups of `partition` ordered by identifier.
    async fn file_groups_for_partition(
        &self,
        partition: &str,
    ) -> Result<Vec<FileGroup>, CatalogError>;

    /// Aggregate size statistics used for metrics.
    async fn table_stats(&self) -> Result<TableStats, CatalogError>;
}
