use async_trait::async_trait;
use futures::future::try_join_all;

use crate::{
    client::{ClientError, CleanStats, CompactionStats, WriteClient, WriteStatus},
    instant::InstantTime,
    mem::MemTable,
    record::MetadataRecord,
};

/// Engine that splits an upsert across blocking tokio workers.
///
/// Records are chunked over `upsert_parallelism` workers; statuses come back
/// in input order once every worker has joined.
#[derive(Debug, Clone)]
pub struct ParallelEngine {
    table: MemTable,
}

impl ParallelEngine {
    /// Engine writing into `table`.
    #[must_use]
    pub fn new(table: MemTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl WriteClient for ParallelEngine {
    async fn begin(&mut self, instant: &InstantTime) -> Result<(), ClientError> {
        self.table.begin(instant)
    }

    async fn upsert(
        &mut self,
        records: Vec<MetadataRecord>,
        instant: &InstantTime,
    ) -> Result<Vec<WriteStatus>, ClientError> {
        self.table.prepare_upsert(instant)?;

        let workers = self.table.options().parallelism();
        let chunk_size = records.len().div_ceil(workers).max(1);
        let mut remaining = records.into_iter();
        let mut handles = Vec::with_capacity(workers);
        loop {
            let chunk: Vec<MetadataRecord> = remaining.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            let table = self.table.clone();
            let instant = instant.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                chunk
                    .iter()
                    .map(|record| table.write_record(record, &instant))
                    .collect::<Vec<_>>()
            }));
        }

        let statuses: Vec<WriteStatus> = try_join_all(handles)
            .await
            .map_err(|err| ClientError::Worker(err.to_string()))?
            .into_iter()
            .flatten()
            .collect();
        self.table.finish_upsert(instant, &statuses)?;
        Ok(statuses)
    }

    async fn schedule_compaction(&mut self, instant: &InstantTime) -> Result<bool, ClientError> {
        self.table.schedule_compaction(instant)
    }

    async fn compact(&mut self, instant: &InstantTime) -> Result<CompactionStats, ClientError> {
        self.table.compact(instant)
    }

    async fn clean(&mut self, instant: &InstantTime) -> Result<CleanStats, ClientError> {
        self.table.clean(instant)
    }
}
