use thiserror::Error;

use crate::{
    catalog::CatalogError, client::ClientError, instant::InstantTime, timeline::TimelineError,
};

/// Error returned by the metadata commit path.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Commit attempted while the metadata writer is disabled.
    #[error("metadata table cannot be committed to as it is not enabled")]
    NotEnabled,
    /// Routing input disagrees with the catalog's file-group count.
    #[error(
        "invalid number of file groups for partition `{partition}`: found={found}, required={required}"
    )]
    ConfigurationMismatch {
        /// Partition being routed.
        partition: String,
        /// File groups listed by the catalog.
        found: usize,
        /// File groups requested by the caller.
        required: usize,
    },
    /// A record in the batch belongs to another partition.
    #[error("record `{record_key}` belongs to partition `{found}`, not `{partition}`")]
    PartitionMismatch {
        /// Partition being committed.
        partition: String,
        /// Key of the offending record.
        record_key: String,
        /// Partition the record is tagged with.
        found: String,
    },
    /// At least one record failed to write.
    #[error("failed to commit metadata table records at instant {instant} ({failed_records} failed)")]
    CommitFailed {
        /// Instant of the failed attempt.
        instant: InstantTime,
        /// Number of records reporting an error.
        failed_records: usize,
    },
    /// A completed instant expected on the timeline is missing.
    #[error("timeline corruption: completed instant {instant} not found")]
    TimelineCorruption {
        /// Instant that could not be located.
        instant: InstantTime,
    },
    /// Timeline collaborator failure.
    #[error("timeline error: {0}")]
    Timeline(#[from] TimelineError),
    /// Catalog collaborator failure.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    /// Write-client collaborator failure.
    #[error("write client error: {0}")]
    Client(#[from] ClientError),
}

/// Convenience result alias for the commit path.
pub type MetadataResult<T> = Result<T, MetadataError>;
