//! Writer and reference-table configuration.
//!
//! Loading configuration from files or the environment is left to the
//! embedding application; these types only carry and validate settings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::instant::InstantSuffix;

/// Rejected configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Compaction and clean suffixes must differ.
    #[error("compaction and clean suffixes must differ (both `{0}`)")]
    DuplicateSuffix(String),
    /// Suffixes must have equal width so derived instants compare consistently.
    #[error("suffix widths differ: compaction={compaction} clean={clean}")]
    SuffixWidth {
        /// Width of the compaction suffix.
        compaction: usize,
        /// Width of the clean suffix.
        clean: usize,
    },
    /// A numeric option must be positive.
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
}

/// Settings of the metadata commit orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataWriterConfig {
    enabled: bool,
    metrics_enabled: bool,
    compaction_suffix: InstantSuffix,
    clean_suffix: InstantSuffix,
}

impl Default for MetadataWriterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            metrics_enabled: true,
            compaction_suffix: InstantSuffix::compaction(),
            clean_suffix: InstantSuffix::clean(),
        }
    }
}

impl MetadataWriterConfig {
    /// Enable or disable the metadata table.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Enable or disable metrics collection.
    #[must_use]
    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Override the suffix appended to derive compaction instants.
    #[must_use]
    pub fn compaction_suffix(mut self, suffix: InstantSuffix) -> Self {
        self.compaction_suffix = suffix;
        self
    }

    /// Override the suffix appended to derive clean instants.
    #[must_use]
    pub fn clean_suffix(mut self, suffix: InstantSuffix) -> Self {
        self.clean_suffix = suffix;
        self
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compaction_suffix == self.clean_suffix {
            return Err(ConfigError::DuplicateSuffix(
                self.clean_suffix.as_str().to_string(),
            ));
        }
        if self.compaction_suffix.width() != self.clean_suffix.width() {
            return Err(ConfigError::SuffixWidth {
                compaction: self.compaction_suffix.width(),
                clean: self.clean_suffix.width(),
            });
        }
        Ok(())
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn is_metrics_enabled(&self) -> bool {
        self.metrics_enabled
    }

    pub(crate) fn compaction_suffix_ref(&self) -> &InstantSuffix {
        &self.compaction_suffix
    }

    pub(crate) fn clean_suffix_ref(&self) -> &InstantSuffix {
        &self.clean_suffix
    }
}

/// Tuning knobs of the in-memory reference metadata table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemTableOptions {
    max_delta_commits_before_compaction: usize,
    retained_file_versions: usize,
    upsert_parallelism: usize,
}

impl Default for MemTableOptions {
    fn default() -> Self {
        Self {
            max_delta_commits_before_compaction: 1,
            retained_file_versions: 2,
            upsert_parallelism: 4,
        }
    }
}

impl MemTableOptions {
    /// Delta commits required since the last compaction before a plan is scheduled.
    #[must_use]
    pub fn max_delta_commits_before_compaction(mut self, commits: usize) -> Self {
        self.max_delta_commits_before_compaction = commits;
        self
    }

    /// File slices kept per file group by cleaning.
    #[must_use]
    pub fn retained_file_versions(mut self, versions: usize) -> Self {
        self.retained_file_versions = versions;
        self
    }

    /// Worker tasks used by the parallel engine.
    #[must_use]
    pub fn upsert_parallelism(mut self, workers: usize) -> Self {
        self.upsert_parallelism = workers;
        self
    }

    /// Reject zero-valued options.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_delta_commits_before_compaction == 0 {
            return Err(ConfigError::Zero("max_delta_commits_before_compaction"));
        }
        if self.retained_file_versions == 0 {
            return Err(ConfigError::Zero("retained_file_versions"));
        }
        if self.upsert_parallelism == 0 {
            return Err(ConfigError::Zero("upsert_parallelism"));
        }
        Ok(())
    }

    pub(crate) fn compaction_threshold(&self) -> usize {
        self.max_delta_commits_before_compaction
    }

    pub(crate) fn retained_versions(&self) -> usize {
        self.retained_file_versions
    }

    pub(crate) fn parallelism(&self) -> usize {
        self.upsert_parallelism
    }
}
