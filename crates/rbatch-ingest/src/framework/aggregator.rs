//! Post-run rollup and partition cleanup

use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

use super::types::{PartitionDescriptor, PartitionReport, RunStatistics, RunStatus};

pub const DEFAULT_FAILURE_RATE_THRESHOLD: f64 = 5.0;

#[derive(Debug, Clone, Serialize)]
pub struct Aggregation {
    pub status: RunStatus,
    pub statistics: RunStatistics,
    pub failure_rate: f64,
    pub threshold_exceeded: bool,
}

/// Whether a failure rate warrants a warning; equal to the threshold does not
pub fn exceeds_threshold(failure_rate: f64, threshold: f64) -> bool {
    failure_rate > threshold
}

/// Fold worker reports into run-wide statistics
///
/// `statistics` is the value started at the beginning of the run; its end
/// timestamp is stamped here. The run fails only if a partition failed.
pub fn aggregate(
    mut statistics: RunStatistics,
    reports: &[PartitionReport],
    threshold: f64,
) -> Aggregation {
    for report in reports {
        statistics.absorb(&report.stats);
        debug!(
            partition = report.index,
            status = ?report.status,
            read = report.stats.read,
            written = report.stats.written,
            skipped = report.stats.skipped,
            committed = report.stats.committed,
            rolled_back = report.stats.rolled_back,
            "Partition summary"
        );
    }
    statistics.ended_at = Some(Utc::now());

    let failed = reports.iter().filter(|r| r.failed()).count();
    let status = if failed > 0 {
        RunStatus::Failed
    } else {
        RunStatus::Completed
    };

    let failure_rate = statistics.failure_rate();
    let threshold_exceeded = exceeds_threshold(failure_rate, threshold);
    let rate = format!("{:.2}", failure_rate);

    info!(
        status = status.as_str(),
        partitions = reports.len(),
        failed_partitions = failed,
        read = statistics.read,
        written = statistics.written,
        skipped = statistics.skipped,
        committed = statistics.committed,
        rolled_back = statistics.rolled_back,
        failure_rate = %rate,
        "Run statistics"
    );
    if threshold_exceeded {
        warn!(
            failure_rate = %rate,
            threshold,
            "Failure rate above threshold, check the failure log"
        );
    }

    Aggregation {
        status,
        statistics,
        failure_rate,
        threshold_exceeded,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cleanup {
    pub removed: usize,
    pub failed: usize,
    pub dir_removed: bool,
}

/// Delete partition files, then the directory if nothing else is left
///
/// The directory is kept whenever a known partition file could not be
/// removed or unrelated files remain in it.
pub fn cleanup_partitions(dir: &Path, partitions: &[PartitionDescriptor]) -> Cleanup {
    let mut cleanup = Cleanup::default();

    for partition in partitions {
        match fs::remove_file(&partition.path) {
            Ok(()) => cleanup.removed += 1,
            Err(e) if e.kind() == IoErrorKind::NotFound => {},
            Err(e) => {
                cleanup.failed += 1;
                warn!(
                    path = %partition.path.display(),
                    error = %e,
                    "Failed to delete partition file"
                );
            },
        }
    }

    if cleanup.failed > 0 {
        warn!(
            dir = %dir.display(),
            failed = cleanup.failed,
            "Partition directory kept, some files could not be deleted"
        );
        return cleanup;
    }

    let empty = fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false);
    if !empty {
        debug!(dir = %dir.display(), "Partition directory not empty, left in place");
        return cleanup;
    }

    match fs::remove_dir(dir) {
        Ok(()) => cleanup.dir_removed = true,
        Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to delete partition directory"),
    }

    info!(dir = %dir.display(), removed = cleanup.removed, "Partition files cleaned up");
    cleanup
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::types::{PartitionStats, PartitionStatus};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn report(index: usize, read: u64, skipped: u64, status: PartitionStatus) -> PartitionReport {
        PartitionReport {
            index,
            path: PathBuf::from(format!("part-{:03}.csv", index)),
            status,
            stats: PartitionStats {
                read,
                written: read - skipped,
                skipped,
                committed: 1,
                rolled_back: 0,
            },
            error: None,
        }
    }

    #[test]
    fn test_threshold_is_strict() {
        assert!(!exceeds_threshold(5.0, 5.0));
        assert!(exceeds_threshold(5.01, 5.0));
        assert!(!exceeds_threshold(0.0, 5.0));
    }

    #[test]
    fn test_aggregate_sums_and_flags() {
        let reports = vec![
            report(0, 100, 3, PartitionStatus::Completed),
            report(1, 100, 3, PartitionStatus::Completed),
        ];
        let agg = aggregate(RunStatistics::start(), &reports, DEFAULT_FAILURE_RATE_THRESHOLD);

        assert_eq!(agg.status, RunStatus::Completed);
        assert_eq!(agg.statistics.read, 200);
        assert_eq!(agg.statistics.written, 194);
        assert_eq!(agg.statistics.committed, 2);
        assert!((agg.failure_rate - 3.0).abs() < 1e-9);
        assert!(!agg.threshold_exceeded);
        assert!(agg.statistics.ended_at.is_some());
    }

    #[test]
    fn test_warning_just_above_five_percent() {
        let at = aggregate(
            RunStatistics::start(),
            &[report(0, 100, 5, PartitionStatus::Completed)],
            DEFAULT_FAILURE_RATE_THRESHOLD,
        );
        assert!(!at.threshold_exceeded);

        let above = aggregate(
            RunStatistics::start(),
            &[report(0, 100, 6, PartitionStatus::Completed)],
            DEFAULT_FAILURE_RATE_THRESHOLD,
        );
        assert!(above.threshold_exceeded);
        assert_eq!(above.status, RunStatus::Completed);
    }

    #[test]
    fn test_any_failed_partition_fails_run() {
        let agg = aggregate(
            RunStatistics::start(),
            &[
                report(0, 10, 0, PartitionStatus::Completed),
                report(1, 0, 0, PartitionStatus::Failed),
            ],
            DEFAULT_FAILURE_RATE_THRESHOLD,
        );
        assert_eq!(agg.status, RunStatus::Failed);
    }

    #[test]
    fn test_empty_run_has_zero_rate() {
        let agg = aggregate(RunStatistics::start(), &[], DEFAULT_FAILURE_RATE_THRESHOLD);
        assert_eq!(agg.failure_rate, 0.0);
        assert_eq!(agg.status, RunStatus::Completed);
    }

    fn partitions_in(dir: &Path, count: usize) -> Vec<PartitionDescriptor> {
        fs::create_dir_all(dir).unwrap();
        (0..count)
            .map(|index| {
                let path = dir.join(format!("restaurant-part-{:03}.csv", index));
                fs::write(&path, "h\n").unwrap();
                PartitionDescriptor {
                    index,
                    path,
                    line_bound: 1,
                }
            })
            .collect()
    }

    #[test]
    fn test_cleanup_removes_files_and_empty_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("partitioned");
        let partitions = partitions_in(&dir, 3);

        let cleanup = cleanup_partitions(&dir, &partitions);

        assert_eq!(cleanup.removed, 3);
        assert!(cleanup.dir_removed);
        assert!(!dir.exists());
    }

    #[test]
    fn test_cleanup_keeps_dir_with_foreign_files() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("partitioned");
        let partitions = partitions_in(&dir, 2);
        fs::write(dir.join("notes.txt"), "keep me").unwrap();

        let cleanup = cleanup_partitions(&dir, &partitions);

        assert_eq!(cleanup.removed, 2);
        assert!(!cleanup.dir_removed);
        assert!(dir.join("notes.txt").exists());
    }

    #[test]
    fn test_cleanup_keeps_dir_when_a_removal_fails() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("partitioned");
        let mut partitions = partitions_in(&dir, 1);
        // a directory in place of a partition file cannot be removed as a file
        let stubborn = dir.join("restaurant-part-001.csv");
        fs::create_dir_all(&stubborn).unwrap();
        partitions.push(PartitionDescriptor {
            index: 1,
            path: stubborn.clone(),
            line_bound: 1,
        });

        let cleanup = cleanup_partitions(&dir, &partitions);

        assert_eq!(cleanup.removed, 1);
        assert_eq!(cleanup.failed, 1);
        assert!(!cleanup.dir_removed);
        assert!(stubborn.exists());
    }
}
