//! Run and partition lifecycle callbacks

use tracing::{error, info};
use uuid::Uuid;

use super::types::{PartitionDescriptor, PartitionReport, RunStatistics, RunStatus, TuningPlan};

/// Observer of run and partition boundaries
///
/// Called from worker tasks, so implementations must be cheap and must not
/// block. Every method defaults to a no-op.
pub trait LifecycleHooks: Send + Sync {
    fn on_run_start(&self, _run_id: Uuid, _plan: &TuningPlan, _partitions: usize) {}

    fn on_partition_start(&self, _partition: &PartitionDescriptor) {}

    fn on_partition_end(&self, _report: &PartitionReport) {}

    fn on_run_end(&self, _run_id: Uuid, _status: RunStatus, _stats: &RunStatistics) {}
}

pub struct NoopHooks;

impl LifecycleHooks for NoopHooks {}

/// Structured log line at every boundary
pub struct LoggingHooks;

impl LifecycleHooks for LoggingHooks {
    fn on_run_start(&self, run_id: Uuid, plan: &TuningPlan, partitions: usize) {
        info!(
            %run_id,
            partitions,
            partition_size = plan.partition_size,
            parallelism = plan.parallelism,
            batch_size = plan.batch_size,
            "Ingestion run started"
        );
    }

    fn on_partition_start(&self, partition: &PartitionDescriptor) {
        info!(
            partition = %partition.name(),
            path = %partition.path.display(),
            "Partition started"
        );
    }

    fn on_partition_end(&self, report: &PartitionReport) {
        let stats = &report.stats;
        if let Some(cause) = &report.error {
            error!(
                partition = report.index,
                read = stats.read,
                written = stats.written,
                skipped = stats.skipped,
                error = %cause,
                "Partition failed"
            );
        } else {
            info!(
                partition = report.index,
                read = stats.read,
                written = stats.written,
                skipped = stats.skipped,
                committed = stats.committed,
                rolled_back = stats.rolled_back,
                "Partition completed"
            );
        }
    }

    fn on_run_end(&self, run_id: Uuid, status: RunStatus, stats: &RunStatistics) {
        info!(
            %run_id,
            status = status.as_str(),
            read = stats.read,
            written = stats.written,
            skipped = stats.skipped,
            duration_ms = stats.duration_ms().unwrap_or_default(),
            "Ingestion run finished"
        );
    }
}
