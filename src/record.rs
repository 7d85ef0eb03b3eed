//! Metadata records and their routed storage location.

use serde::{Deserialize, Serialize};

use crate::{catalog::FileGroupId, instant::InstantTime};

/// Physical location of a record: a file group and the base instant of its current slice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordLocation {
    /// Base instant of the file slice the record is written against.
    pub base_instant: InstantTime,
    /// File group receiving the record.
    pub file_group_id: FileGroupId,
}

/// A key/value unit destined for one metadata partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    key: String,
    partition: String,
    payload: Vec<u8>,
    location: Option<RecordLocation>,
}

impl MetadataRecord {
    /// Build an unrouted record.
    pub fn new(key: impl Into<String>, partition: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            partition: partition.into(),
            payload,
            location: None,
        }
    }

    /// Record key, unique within a partition.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Metadata partition the record belongs to.
    #[must_use]
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// Opaque record body.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Location assigned by the router, if any.
    #[must_use]
    pub fn location(&self) -> Option<&RecordLocation> {
        self.location.as_ref()
    }

    pub(crate) fn set_location(&mut self, location: RecordLocation) {
        self.location = Some(location);
    }
}
