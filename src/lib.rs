#![deny(missing_docs)]
//! Write-path orchestration for a lakehouse metadata table.
//!
//! The metadata table caches derived information about a primary data table
//! (file listings, column statistics) as records stored in the same
//! log-structured format. [`MetadataWriter`] applies a batch of those records
//! to one metadata partition as an atomically visible commit:
//!
//! 1. [`router`] tags each record with the file group its key maps to.
//! 2. [`reconciler`] checks whether the instant was already completed by an
//!    earlier attempt and, if so, erases that completion.
//! 3. The engine behind [`client::WriteClient`] writes the batch; any failed
//!    record fails the whole commit.
//! 4. [`maintenance`] compacts and cleans the metadata table under instants
//!    derived from the commit.
//!
//! [`mem`] provides in-memory collaborators and [`engine`] the execution
//! engines that write into them.

/// File groups and the catalog listing them.
pub mod catalog;
/// Write-client capability set.
pub mod client;
/// Writer and reference-table configuration.
pub mod config;
/// Execution engines.
pub mod engine;
/// Instant identifiers and derivation suffixes.
pub mod instant;
/// Post-commit compaction and cleaning.
pub mod maintenance;
/// In-memory reference collaborators.
pub mod mem;
/// Writer metrics.
pub mod metrics;
/// Retry reconciliation against the metadata timeline.
pub mod reconciler;
/// Metadata records.
pub mod record;
/// Record-key routing.
pub mod router;
/// Timeline access.
pub mod timeline;
/// Commit orchestration.
pub mod writer;

mod error;
mod logging;

pub use crate::{
    error::{MetadataError, MetadataResult},
    instant::{Instant, InstantAction, InstantState, InstantSuffix, InstantTime},
    record::{MetadataRecord, RecordLocation},
    writer::{Bootstrap, BootstrapError, Collaborators, CommitReport, MetadataWriter},
};
