//! Deterministic routing of record keys onto a partition's file groups.

use crate::{
    catalog::{CatalogError, FileGroupCatalog},
    error::{MetadataError, MetadataResult},
    record::{MetadataRecord, RecordLocation},
};

/// Map `key` to a file-group index in `[0, num_file_groups)`.
///
/// The hash is the 31-multiplier polynomial over UTF-16 code units with
/// wrapping 32-bit arithmetic, so the mapping is stable across processes and
/// matches the layout produced by other writers of the same table format.
/// Returns `None` when `num_file_groups` is zero.
#[must_use]
pub fn file_group_index(key: &str, num_file_groups: usize) -> Option<usize> {
    let mut hash: i32 = 0;
    for unit in key.encode_utf16() {
        hash = hash.wrapping_mul(31).wrapping_add(i32::from(unit));
    }
    (hash.unsigned_abs() as usize).checked_rem(num_file_groups)
}

/// Tags records with the location of the file group their key maps to.
pub struct ShardRouter<'a> {
    catalog: &'a dyn FileGroupCatalog,
}

impl<'a> ShardRouter<'a> {
    /// Build a router reading file groups from `catalog`.
    pub fn new(catalog: &'a dyn FileGroupCatalog) -> Self {
        Self { catalog }
    }

    /// Assign every record a location within `partition`.
    ///
    /// Fails with [`MetadataError::ConfigurationMismatch`] when the catalog does
    /// not list exactly `num_file_groups` file groups, when that count is zero,
    /// or when the partition was never initialized (zero file groups). Records
    /// tagged with another partition fail with [`MetadataError::PartitionMismatch`].
    pub async fn route(
        &self,
        mut records: Vec<MetadataRecord>,
        partition: &str,
        num_file_groups: usize,
    ) -> MetadataResult<Vec<MetadataRecord>> {
        if let Some(stray) = records.iter().find(|record| record.partition() != partition) {
            return Err(MetadataError::PartitionMismatch {
                partition: partition.to_string(),
                record_key: stray.key().to_string(),
                found: stray.partition().to_string(),
            });
        }

        let mut file_groups = match self.catalog.file_groups_for_partition(partition).await {
            Ok(groups) => groups,
            Err(CatalogError::UnknownPartition(_)) => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        let mismatch = |found: usize| MetadataError::ConfigurationMismatch {
            partition: partition.to_string(),
            found,
            required: num_file_groups,
        };
        if num_file_groups == 0 || file_groups.len() != num_file_groups {
            return Err(mismatch(file_groups.len()));
        }
        file_groups.sort_by(|a, b| a.id().cmp(b.id()));

        for record in &mut records {
            let Some(group) = file_group_index(record.key(), num_file_groups)
                .and_then(|index| file_groups.get(index))
            else {
                return Err(mismatch(file_groups.len()));
            };
            record.set_location(RecordLocation {
                base_instant: group.base_instant().clone(),
                file_group_id: group.id().clone(),
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{
        catalog::{FileGroup, FileGroupId, TableStats},
        instant::InstantTime,
    };

    struct FixedCatalog {
        groups: Vec<FileGroup>,
    }

    impl FixedCatalog {
        fn with_groups(count: usize) -> Self {
            let groups = (0..count)
                .map(|index| FileGroup::new(FileGroupId::generate("files", index), InstantTime::init()))
                .collect();
            Self { groups }
        }
    }

    #[async_trait]
    impl FileGroupCatalog for FixedCatalog {
        async fn file_groups_for_partition(
            &self,
            partition: &str,
        ) -> Result<Vec<FileGroup>, CatalogError> {
            if partition != "files" {
                return Err(CatalogError::UnknownPartition(partition.to_string()));
            }
            // Reverse to prove the router imposes its own order.
            Ok(self.groups.iter().rev().cloned().collect())
        }

        async fn table_stats(&self) -> Result<TableStats, CatalogError> {
            Ok(TableStats::default())
        }
    }

    fn records(keys: &[&str]) -> Vec<MetadataRecord> {
        keys.iter()
            .map(|key| MetadataRecord::new(*key, "files", key.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn index_matches_reference_hash() {
        // "abc".hashCode() == 96354 in the reference layout.
        assert_eq!(file_group_index("abc", 1_000_000), Some(96_354));
        assert_eq!(file_group_index("", 7), Some(0));
        assert_eq!(file_group_index("anything", 1), Some(0));
        assert_eq!(file_group_index("anything", 0), None);
    }

    #[test]
    fn index_is_in_range_for_random_keys() {
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..1_000 {
            let len = rng.usize(0..32);
            let key: String = (0..len).map(|_| rng.char(..)).collect();
            let groups = rng.usize(1..64);
            let index = file_group_index(&key, groups).expect("non-zero groups");
            assert!(index < groups);
            assert_eq!(Some(index), file_group_index(&key, groups));
        }
    }

    #[tokio::test]
    async fn routing_is_deterministic() {
        let catalog = FixedCatalog::with_groups(4);
        let router = ShardRouter::new(&catalog);
        let keys = ["partition-a", "partition-b", "2023/01/01", "__all_partitions__"];

        let first = router.route(records(&keys), "files", 4).await.expect("route");
        let second = router.route(records(&keys), "files", 4).await.expect("route");
        assert_eq!(first, second);

        let mut sorted = catalog.groups.clone();
        sorted.sort_by(|a, b| a.id().cmp(b.id()));
        for record in &first {
            let location = record.location().expect("routed");
            let expected = &sorted[file_group_index(record.key(), 4).expect("index")];
            assert_eq!(&location.file_group_id, expected.id());
            assert_eq!(&location.base_instant, expected.base_instant());
        }
    }

    #[tokio::test]
    async fn mismatched_group_count_is_rejected() {
        let catalog = FixedCatalog::with_groups(2);
        let router = ShardRouter::new(&catalog);

        let err = router
            .route(records(&["k"]), "files", 1)
            .await
            .expect_err("mismatch");
        assert!(matches!(
            err,
            MetadataError::ConfigurationMismatch {
                found: 2,
                required: 1,
                ..
            }
        ));
        assert!(router.route(records(&["k"]), "files", 2).await.is_ok());
    }

    #[tokio::test]
    async fn zero_groups_is_rejected() {
        let catalog = FixedCatalog::with_groups(0);
        let router = ShardRouter::new(&catalog);
        let err = router
            .route(records(&["k"]), "files", 0)
            .await
            .expect_err("zero groups");
        assert!(matches!(err, MetadataError::ConfigurationMismatch { required: 0, .. }));
    }

    #[tokio::test]
    async fn uninitialized_partition_has_zero_file_groups() {
        let catalog = FixedCatalog::with_groups(1);
        let router = ShardRouter::new(&catalog);
        let record = MetadataRecord::new("col-a", "column_stats", vec![1]);
        let err = router
            .route(vec![record], "column_stats", 1)
            .await
            .expect_err("unknown partition");
        assert!(matches!(
            err,
            MetadataError::ConfigurationMismatch {
                found: 0,
                required: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn records_of_another_partition_are_rejected() {
        let catalog = FixedCatalog::with_groups(1);
        let router = ShardRouter::new(&catalog);
        let mut batch = records(&["k"]);
        batch.push(MetadataRecord::new("col-a", "column_stats", vec![1]));

        let err = router
            .route(batch, "files", 1)
            .await
            .expect_err("stray record");
        match err {
            MetadataError::PartitionMismatch {
                partition,
                record_key,
                found,
            } => {
                assert_eq!(partition, "files");
                assert_eq!(record_key, "col-a");
                assert_eq!(found, "column_stats");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
