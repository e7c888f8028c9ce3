//! Shared fixtures for pipeline integration tests
//!
//! [`MemorySink`] stands in for the database so whole runs can execute
//! without Docker. Rows are built for the 47-column restaurant schema and
//! written in the same legacy Korean encoding the production input uses.

#![allow(dead_code)]

use async_trait::async_trait;
use rbatch_ingest::error::{IngestError, Result};
use rbatch_ingest::framework::{NoopHooks, RecordSink, RetryPolicy};
use rbatch_ingest::launcher::{IngestionJob, JobParams, PlanOverrides};
use rbatch_ingest::schema::{restaurant_schema, SqlValue, TableSchema};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory sink with scriptable failures
#[derive(Default)]
pub struct MemorySink {
    rows: Mutex<Vec<Vec<SqlValue>>>,
    calls: AtomicUsize,
    transient_failures: AtomicUsize,
    rejected_ids: HashSet<i32>,
    fatal: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` calls with a transient error
    pub fn with_transient_failures(self, n: usize) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Reject any statement containing one of these record numbers
    pub fn rejecting(mut self, ids: &[i32]) -> Self {
        self.rejected_ids.extend(ids.iter().copied());
        self
    }

    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Record numbers of every stored row, sorted
    pub fn ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter_map(|row| match row.first() {
                Some(SqlValue::Integer(Some(id))) => Some(*id),
                _ => None,
            })
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn insert_rows(&self, _schema: &TableSchema, rows: &[Vec<SqlValue>]) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fatal {
            return Err(IngestError::ResourceFatal("connection pool closed".into()));
        }

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(IngestError::TransientData("connection reset by peer".into()));
        }

        let rejected = rows.iter().any(|row| match row.first() {
            Some(SqlValue::Integer(Some(id))) => self.rejected_ids.contains(id),
            _ => false,
        });
        if rejected {
            return Err(IngestError::Constraint(
                "duplicate key value violates unique constraint".into(),
            ));
        }

        self.rows.lock().unwrap().extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }
}

/// One source line for the restaurant schema
pub fn restaurant_row(id: &str, license_date: &str, male_employees: &str) -> String {
    let mut values = vec![String::new(); 47];
    values[0] = id.to_string();
    values[1] = "일반음식점".to_string();
    values[2] = "07_24_04_P".to_string();
    values[5] = license_date.to_string();
    values[8] = "영업/정상".to_string();
    values[18] = "\"서울특별시 중구 명동1가 1, 2층\"".to_string();
    values[21] = format!("식당{}", id);
    values[22] = "2024-01-02 03:04:05".to_string();
    values[26] = "198765.25".to_string();
    values[27] = "451234.5".to_string();
    values[29] = male_employees.to_string();
    values.join(",")
}

/// Write a source file with the schema header, encoded as EUC-KR
pub fn write_input(dir: &Path, rows: &[String]) -> PathBuf {
    let header = restaurant_schema().labels().join(",");
    let mut content = header;
    content.push_str("\r\n");
    for row in rows {
        content.push_str(row);
        content.push_str("\r\n");
    }

    let (bytes, _, unmappable) = encoding_rs::EUC_KR.encode(&content);
    assert!(!unmappable, "fixture text must be representable in EUC-KR");

    let path = dir.join("restaurant.csv");
    std::fs::write(&path, &bytes).unwrap();
    path
}

pub fn good_rows(ids: std::ops::RangeInclusive<i32>) -> Vec<String> {
    ids.map(|id| restaurant_row(&id.to_string(), "2020-05-17", "3"))
        .collect()
}

/// Run parameters rooted in `dir` with explicit sizing
pub fn params(
    dir: &Path,
    input: PathBuf,
    partition_size: usize,
    batch_size: usize,
    parallelism: usize,
) -> JobParams {
    JobParams {
        input_path: input,
        partition_dir: dir.join("partitioned"),
        partition_prefix: "restaurant-part-".to_string(),
        failure_log: dir.join("failure").join("failed.csv"),
        encoding: encoding_rs::EUC_KR,
        policy: RetryPolicy::new(3).with_backoff(Duration::from_millis(1)),
        failure_rate_threshold: 5.0,
        overrides: PlanOverrides {
            parallelism: Some(parallelism),
            batch_size: Some(batch_size),
            partition_size: Some(partition_size),
        },
        cpu_hint: 4,
    }
}

pub fn job(sink: Arc<MemorySink>) -> IngestionJob {
    IngestionJob::new(restaurant_schema(), sink).with_hooks(Arc::new(NoopHooks))
}

/// Data rows of the failure log, header excluded
pub fn failure_rows(path: &Path) -> Vec<csv::StringRecord> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .unwrap();
    assert_eq!(reader.headers().unwrap().len(), 47);
    reader.records().map(|r| r.unwrap()).collect()
}

pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rbatch_ingest=debug,sqlx=warn")),
        )
        .with_test_writer()
        .try_init();
}
