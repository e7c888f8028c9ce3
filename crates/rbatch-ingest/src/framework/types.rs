//! Core types for the partitioned ingestion pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::IngestError;

/// One parsed source line
///
/// Immutable once built by the partition reader. The natural key is what
/// the failure recorder deduplicates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    key: String,
    partition: usize,
    line: usize,
    values: Vec<String>,
}

impl Record {
    /// Build a record; `key_column` selects the natural key
    ///
    /// Integer keys are normalised (`"007"` and `"7"` share a slot). A blank
    /// key falls back to `<partition>:<line>` so unrelated records never
    /// share a dedup slot.
    pub fn new(partition: usize, line: usize, values: Vec<String>, key_column: usize) -> Self {
        let key = values
            .get(key_column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(|v| match v.parse::<i64>() {
                Ok(n) => n.to_string(),
                Err(_) => v.to_string(),
            })
            .unwrap_or_else(|| format!("{}:{}", partition, line));

        Self {
            key,
            partition,
            line,
            values,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn partition(&self) -> usize {
        self.partition
    }

    /// 1-based line number inside the partition file (header is line 1)
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// One partition file produced by the splitter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionDescriptor {
    pub index: usize,
    pub path: PathBuf,
    /// Upper bound on body lines in this file
    pub line_bound: usize,
}

impl PartitionDescriptor {
    pub fn name(&self) -> String {
        format!("partition-{:03}", self.index)
    }
}

/// Run-wide sizing, computed once from input volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuningPlan {
    /// Body lines per partition file
    pub partition_size: usize,
    /// Concurrent partition workers
    pub parallelism: usize,
    /// Records per transactional write
    pub batch_size: usize,
}

/// Outcome of one unit of work after policy classification
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    Retryable(IngestError),
    Skippable(IngestError),
    Fatal(IngestError),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// Counters kept by a single partition worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStats {
    pub read: u64,
    pub written: u64,
    pub skipped: u64,
    pub committed: u64,
    pub rolled_back: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStatus {
    Completed,
    Failed,
}

/// What a worker hands back to the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionReport {
    pub index: usize,
    pub path: PathBuf,
    pub status: PartitionStatus,
    pub stats: PartitionStats,
    pub error: Option<String>,
}

impl PartitionReport {
    pub fn failed(&self) -> bool {
        self.status == PartitionStatus::Failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// Cumulative counters for a whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub read: u64,
    pub written: u64,
    pub skipped: u64,
    pub committed: u64,
    pub rolled_back: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl RunStatistics {
    pub fn start() -> Self {
        Self {
            read: 0,
            written: 0,
            skipped: 0,
            committed: 0,
            rolled_back: 0,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn absorb(&mut self, stats: &PartitionStats) {
        self.read += stats.read;
        self.written += stats.written;
        self.skipped += stats.skipped;
        self.committed += stats.committed;
        self.rolled_back += stats.rolled_back;
    }

    /// Skipped over read, as a percentage; 0.0 when nothing was read
    pub fn failure_rate(&self) -> f64 {
        if self.read == 0 {
            return 0.0;
        }
        (self.skipped as f64 / self.read as f64) * 100.0
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}
