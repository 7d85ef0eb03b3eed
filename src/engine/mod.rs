//! Execution engines implementing [`WriteClient`](crate::client::WriteClient)
//! over a [`MemTable`](crate::mem::MemTable).
//!
//! Engines only differ in how an upsert distributes per-record writes; both
//! return statuses after every write has finished.

mod local;
#[cfg(feature = "tokio")]
mod parallel;

pub use local::LocalEngine;
#[cfg(feature = "tokio")]
pub use parallel::ParallelEngine;
