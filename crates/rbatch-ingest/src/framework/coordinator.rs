//! Bounded-concurrency dispatch of partition workers
//!
//! One task per partition, at most `parallelism` running at once. A failed
//! or panicked partition never stops its siblings.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use super::types::{PartitionDescriptor, PartitionReport, PartitionStats, PartitionStatus};
use super::worker::PartitionWorker;

pub struct Coordinator {
    worker: Arc<PartitionWorker>,
    parallelism: usize,
}

impl Coordinator {
    pub fn new(worker: Arc<PartitionWorker>, parallelism: usize) -> Self {
        Self {
            worker,
            parallelism: parallelism.max(1),
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Run every partition and collect one report each, sorted by index
    pub async fn run(&self, partitions: Vec<PartitionDescriptor>) -> Vec<PartitionReport> {
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut tasks: JoinSet<PartitionReport> = JoinSet::new();
        let mut reports = Vec::with_capacity(partitions.len());

        debug!(
            partitions = partitions.len(),
            parallelism = self.parallelism,
            "Dispatching partition workers"
        );

        for partition in &partitions {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    reports.push(aborted(partition, format!("Worker slot unavailable: {}", e)));
                    continue;
                },
            };

            let worker = Arc::clone(&self.worker);
            let partition = partition.clone();
            tasks.spawn(async move {
                let report = worker.run(&partition).await;
                drop(permit);
                report
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(join_err) => error!(error = %join_err, "Partition task panicked"),
            }
        }

        // A panicked task leaves no report behind; account for it here.
        let reported: HashSet<usize> = reports.iter().map(|r| r.index).collect();
        for partition in &partitions {
            if !reported.contains(&partition.index) {
                reports.push(aborted(partition, "Worker task terminated abnormally".to_string()));
            }
        }

        reports.sort_by_key(|r| r.index);
        reports
    }
}

fn aborted(partition: &PartitionDescriptor, error: String) -> PartitionReport {
    PartitionReport {
        index: partition.index,
        path: partition.path.clone(),
        status: PartitionStatus::Failed,
        stats: PartitionStats::default(),
        error: Some(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::framework::failure::FailureRecorder;
    use crate::framework::hooks::LifecycleHooks;
    use crate::framework::policy::RetryPolicy;
    use crate::framework::sink::RecordSink;
    use crate::framework::writer::BatchWriter;
    use crate::schema::{Column, ColumnKind, SqlValue, TableSchema};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Tracks how many partitions are in flight at once
    #[derive(Default)]
    struct ConcurrencyProbe {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl LifecycleHooks for ConcurrencyProbe {
        fn on_partition_start(&self, _partition: &PartitionDescriptor) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn on_partition_end(&self, _report: &PartitionReport) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct SlowSink;

    #[async_trait]
    impl RecordSink for SlowSink {
        async fn insert_rows(&self, _schema: &TableSchema, rows: &[Vec<SqlValue>]) -> Result<u64> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(rows.len() as u64)
        }
    }

    fn setup(
        dir: &TempDir,
        files: &[&str],
        probe: Arc<ConcurrencyProbe>,
    ) -> (Arc<PartitionWorker>, Vec<PartitionDescriptor>) {
        let schema = Arc::new(TableSchema {
            table: "t",
            key_column: 0,
            columns: vec![Column {
                name: "id",
                label: "id",
                kind: ColumnKind::Integer,
            }],
        });
        let failures = Arc::new(FailureRecorder::new(dir.path().join("failed.csv"), &schema));
        let writer = BatchWriter::new(
            Arc::new(SlowSink),
            Arc::clone(&schema),
            RetryPolicy::default(),
            failures,
        );
        let worker = Arc::new(PartitionWorker::new(
            schema,
            encoding_rs::UTF_8,
            10,
            false,
            writer,
            probe,
        ));

        let partitions = files
            .iter()
            .enumerate()
            .map(|(index, content)| {
                let path = dir.path().join(format!("part-{:03}.csv", index));
                std::fs::write(&path, content).unwrap();
                PartitionDescriptor {
                    index,
                    path,
                    line_bound: 10,
                }
            })
            .collect();

        (worker, partitions)
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_parallelism() {
        let dir = TempDir::new().unwrap();
        let probe = Arc::new(ConcurrencyProbe::default());
        let files = vec!["id\n1\n2\n"; 6];
        let (worker, partitions) = setup(&dir, &files, Arc::clone(&probe));

        let reports = Coordinator::new(worker, 2).run(partitions).await;

        assert_eq!(reports.len(), 6);
        assert!(reports.iter().all(|r| !r.failed()));
        assert_eq!(reports.iter().map(|r| r.stats.written).sum::<u64>(), 12);
        assert!(probe.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(
            reports.iter().map(|r| r.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4, 5]
        );
    }

    #[tokio::test]
    async fn test_failed_partition_does_not_stop_siblings() {
        let dir = TempDir::new().unwrap();
        let probe = Arc::new(ConcurrencyProbe::default());
        let (worker, partitions) = setup(&dir, &["id\n1\n", "id,extra\n2,x\n", "id\n3\n"], probe);

        let reports = Coordinator::new(worker, 4).run(partitions).await;

        assert!(!reports[0].failed());
        assert!(reports[1].failed());
        assert!(!reports[2].failed());
        assert_eq!(reports[2].stats.written, 1);
    }

    #[tokio::test]
    async fn test_no_partitions() {
        let dir = TempDir::new().unwrap();
        let probe = Arc::new(ConcurrencyProbe::default());
        let (worker, partitions) = setup(&dir, &[], probe);

        let coordinator = Coordinator::new(worker, 0);
        assert_eq!(coordinator.parallelism(), 1);
        assert!(coordinator.run(partitions).await.is_empty());
    }
}
