use async_trait::async_trait;

use crate::{
    client::{ClientError, CleanStats, CompactionStats, WriteClient, WriteStatus},
    instant::InstantTime,
    mem::MemTable,
    record::MetadataRecord,
};

/// Single-process engine writing records one after another.
#[derive(Debug, Clone)]
pub struct LocalEngine {
    table: MemTable,
}

impl LocalEngine {
    /// Engine writing into `table`.
    #[must_use]
    pub fn new(table: MemTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl WriteClient for LocalEngine {
    async fn begin(&mut self, instant: &InstantTime) -> Result<(), ClientError> {
        self.table.begin(instant)
    }

    async fn upsert(
        &mut self,
        records: Vec<MetadataRecord>,
        instant: &InstantTime,
    ) -> Result<Vec<WriteStatus>, ClientError> {
        self.table.prepare_upsert(instant)?;
        let statuses: Vec<WriteStatus> = records
            .iter()
            .map(|record| self.table.write_record(record, instant))
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
