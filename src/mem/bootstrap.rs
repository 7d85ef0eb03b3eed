use async_trait::async_trait;

use crate::{
    mem::MemTable,
    writer::{Bootstrap, BootstrapError},
};

/// Creates missing metadata partitions, one file group each.
#[derive(Debug, Clone)]
pub struct MemBootstrap {
    table: MemTable,
    partitions: Vec<String>,
}

impl MemBootstrap {
    /// Bootstrap `partitions` of `table`.
    pub fn new<I, S>(table: MemTable, partitions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table,
            partitions: partitions.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Bootstrap for MemBootstrap {
    async fn bootstrap_if_needed(&self) -> Result<(), BootstrapError> {
        for partition in &self.partitions {
            if partition.is_empty() {
                return Err(BootstrapError::new("metadata partition name must not be empty"));
            }
            self.table.add_partition(partition, 1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemTableOptions;

    #[tokio::test]
    async fn creates_missing_partitions_only() {
        let table = MemTable::new(MemTableOptions::default()).expect("table");
        table.add_partition("files", 2);
        assert!(!table.has_partition("column_stats"));

        MemBootstrap::new(table.clone(), ["files", "column_stats"])
            .bootstrap_if_needed()
            .await
            .expect("bootstrap");
        assert_eq!(table.slice_counts("files"), vec![1, 1]);
        assert!(table.has_partition("column_stats"));
        assert_eq!(table.slice_counts("column_stats"), vec![1]);
    }

    #[tokio::test]
    async fn empty_partition_name_fails() {
        let table = MemTable::new(MemTableOptions::default()).expect("table");
        let result = MemBootstrap::new(table.clone(), [""]).bootstrap_if_needed().await;
        assert!(result.is_err());
        assert!(!table.has_partition(""));
    }
}
