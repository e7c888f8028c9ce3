//! Partition worker
//!
//! Streams one partition file through the reader, groups records into
//! batches and hands each batch to the [`BatchWriter`]. Records are processed
//! in file order; nothing inside a partition runs in parallel.

use encoding_rs::Encoding;
use std::sync::Arc;
use tracing::warn;

use super::hooks::LifecycleHooks;
use super::policy::{classify, Decision};
use super::reader::PartitionReader;
use super::types::{
    PartitionDescriptor, PartitionReport, PartitionStats, PartitionStatus, Record,
};
use super::writer::{BatchWriter, WriteSummary};
use crate::error::Result;
use crate::schema::TableSchema;

pub struct PartitionWorker {
    schema: Arc<TableSchema>,
    encoding: &'static Encoding,
    batch_size: usize,
    strict: bool,
    writer: BatchWriter,
    hooks: Arc<dyn LifecycleHooks>,
}

impl PartitionWorker {
    pub fn new(
        schema: Arc<TableSchema>,
        encoding: &'static Encoding,
        batch_size: usize,
        strict: bool,
        writer: BatchWriter,
        hooks: Arc<dyn LifecycleHooks>,
    ) -> Self {
        Self {
            schema,
            encoding,
            batch_size: batch_size.max(1),
            strict,
            writer,
            hooks,
        }
    }

    /// Process one partition to completion
    ///
    /// Never fails: a fatal error marks the report as failed and keeps the
    /// counters gathered up to that point.
    pub async fn run(&self, partition: &PartitionDescriptor) -> PartitionReport {
        self.hooks.on_partition_start(partition);

        let mut stats = PartitionStats::default();
        let result = self.process(partition, &mut stats).await;

        let report = PartitionReport {
            index: partition.index,
            path: partition.path.clone(),
            status: if result.is_ok() {
                PartitionStatus::Completed
            } else {
                PartitionStatus::Failed
            },
            stats,
            error: result.err().map(|e| e.to_string()),
        };

        self.hooks.on_partition_end(&report);
        report
    }

    async fn process(
        &self,
        partition: &PartitionDescriptor,
        stats: &mut PartitionStats,
    ) -> Result<()> {
        let mut reader = PartitionReader::open(partition, &self.schema, self.encoding).await?;
        let mut batch: Vec<Record> = Vec::with_capacity(self.batch_size);

        while let Some(item) = reader.next_record().await {
            match item {
                Ok(record) => {
                    stats.read += 1;
                    batch.push(record);
                    if batch.len() >= self.batch_size {
                        self.flush(&mut batch, stats).await?;
                    }
                },
                Err(e) => match classify(e.kind(), self.strict) {
                    Decision::Skip => {
                        // No trustworthy key on an unparsable line, so it is
                        // counted and logged but kept out of the failure log.
                        stats.read += 1;
                        stats.skipped += 1;
                        warn!(partition = partition.index, error = %e, "Unparsable line skipped");
                    },
                    Decision::Retry | Decision::Fatal => {
                        self.flush(&mut batch, stats).await?;
                        return Err(e);
                    },
                },
            }
        }

        self.flush(&mut batch, stats).await
    }

    async fn flush(&self, batch: &mut Vec<Record>, stats: &mut PartitionStats) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut summary = WriteSummary::default();
        let result = self.writer.write_batch(batch, &mut summary).await;
        batch.clear();

        // Merged before propagating so a fatal error keeps what already landed
        stats.written += summary.written;
        stats.skipped += summary.skipped;
        stats.committed += summary.committed;
        stats.rolled_back += summary.rolled_back;
        result
    }
}
