//! In-memory reference implementation of the metadata table collaborators.
//!
//! [`MemTable`] plays the file-group catalog and the storage the engines write
//! to, [`MemTimeline`] plays both the metadata and the data-table timelines,
//! and [`MemBootstrap`] initializes partitions on first use.

mod bootstrap;
mod table;
mod timeline;

pub use bootstrap::MemBootstrap;
pub use table::MemTable;
pub use timeline::MemTimeline;
