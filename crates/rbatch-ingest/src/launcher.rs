//! Job launcher
//!
//! Drives one run end to end: count, tune, split, dispatch workers,
//! aggregate, clean up. Stands in for the external orchestrator; the
//! framework itself never reads configuration.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use encoding_rs::Encoding;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::JobConfig;
use crate::framework::aggregator::{aggregate, cleanup_partitions};
use crate::framework::coordinator::Coordinator;
use crate::framework::failure::FailureRecorder;
use crate::framework::hooks::{LifecycleHooks, LoggingHooks};
use crate::framework::policy::RetryPolicy;
use crate::framework::reader::resolve_encoding;
use crate::framework::sink::RecordSink;
use crate::framework::splitter::{count_body_lines, split};
use crate::framework::tuner::{available_cpus, tune};
use crate::framework::types::{PartitionReport, RunStatistics, RunStatus, TuningPlan};
use crate::framework::worker::PartitionWorker;
use crate::framework::writer::BatchWriter;
use crate::schema::TableSchema;

/// Failure log file name for a run started at `at`
pub fn failure_log_path(dir: &Path, at: DateTime<Local>) -> PathBuf {
    dir.join(format!("failed-{}.csv", at.format("%Y-%m-%d_%H-%M-%S")))
}

/// Values that replace individual tuned values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanOverrides {
    pub parallelism: Option<usize>,
    pub batch_size: Option<usize>,
    pub partition_size: Option<usize>,
}

impl PlanOverrides {
    pub fn apply(&self, plan: TuningPlan) -> TuningPlan {
        TuningPlan {
            partition_size: self.partition_size.unwrap_or(plan.partition_size).max(1),
            parallelism: self.parallelism.unwrap_or(plan.parallelism).max(1),
            batch_size: self.batch_size.unwrap_or(plan.batch_size).max(1),
        }
    }
}

/// Everything a run needs, resolved up front
#[derive(Debug, Clone)]
pub struct JobParams {
    pub input_path: PathBuf,
    pub partition_dir: PathBuf,
    pub partition_prefix: String,
    pub failure_log: PathBuf,
    pub encoding: &'static Encoding,
    pub policy: RetryPolicy,
    pub failure_rate_threshold: f64,
    pub overrides: PlanOverrides,
    pub cpu_hint: usize,
}

impl JobParams {
    /// Resolve job configuration; the failure log is named after `started`
    pub fn from_config(job: &JobConfig, started: DateTime<Local>) -> Result<Self> {
        let encoding = resolve_encoding(&job.encoding)
            .with_context(|| format!("Unknown source encoding '{}'", job.encoding))?;

        Ok(Self {
            input_path: job.input_path.clone(),
            partition_dir: job.partition_dir.clone(),
            partition_prefix: job.partition_prefix.clone(),
            failure_log: failure_log_path(&job.failure_dir, started),
            encoding,
            policy: RetryPolicy::new(job.max_attempts)
                .with_strict(job.strict_mode)
                .with_backoff(Duration::from_millis(job.retry_backoff_ms)),
            failure_rate_threshold: job.failure_rate_threshold,
            overrides: PlanOverrides {
                parallelism: job.parallelism,
                batch_size: job.batch_size,
                partition_size: job.partition_size,
            },
            cpu_hint: available_cpus(),
        })
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub plan: TuningPlan,
    pub statistics: RunStatistics,
    pub partitions: Vec<PartitionReport>,
    pub failure_rate: f64,
    pub threshold_exceeded: bool,
    pub failure_log: PathBuf,
    pub failure_log_rows: u64,
    pub partition_dir_removed: bool,
    pub duration_ms: i64,
}

pub struct IngestionJob {
    schema: Arc<TableSchema>,
    sink: Arc<dyn RecordSink>,
    hooks: Arc<dyn LifecycleHooks>,
}

impl IngestionJob {
    pub fn new(schema: TableSchema, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            schema: Arc::new(schema),
            sink,
            hooks: Arc::new(LoggingHooks),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Plan a run over `input` without touching anything
    pub async fn plan(
        input: &Path,
        cpu_hint: usize,
        overrides: PlanOverrides,
    ) -> Result<(usize, TuningPlan)> {
        let source = input.to_path_buf();
        let total = tokio::task::spawn_blocking(move || count_body_lines(&source))
            .await
            .context("Line counting task failed")?
            .with_context(|| format!("Failed to read {}", input.display()))?;

        Ok((total, overrides.apply(tune(total, cpu_hint))))
    }

    /// Execute one run
    ///
    /// Returns `Err` only when the run cannot start (unreadable input, failed
    /// split). Partition-level failures show up in the report status.
    pub async fn run(&self, params: &JobParams) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started = RunStatistics::start();

        let (total, plan) =
            Self::plan(&params.input_path, params.cpu_hint, params.overrides).await?;
        info!(
            %run_id,
            input = %params.input_path.display(),
            records = total,
            "Input measured"
        );

        let partitions = {
            let source = params.input_path.clone();
            let dir = params.partition_dir.clone();
            let prefix = params.partition_prefix.clone();
            let size = plan.partition_size;
            tokio::task::spawn_blocking(move || split(&source, &dir, &prefix, size))
                .await
                .context("Split task failed")?
                .context("Failed to split input into partitions")?
        };

        let failures = Arc::new(FailureRecorder::new(&params.failure_log, &self.schema));
        if let Err(e) = failures.initialize() {
            warn!(error = %e, "Failure log could not be created, will retry on first skip");
        }

        self.hooks.on_run_start(run_id, &plan, partitions.len());

        let writer = BatchWriter::new(
            Arc::clone(&self.sink),
            Arc::clone(&self.schema),
            params.policy,
            Arc::clone(&failures),
        );
        let worker = Arc::new(PartitionWorker::new(
            Arc::clone(&self.schema),
            params.encoding,
            plan.batch_size,
            params.policy.strict,
            writer,
            Arc::clone(&self.hooks),
        ));
        let reports = Coordinator::new(worker, plan.parallelism)
            .run(partitions.clone())
            .await;

        let aggregation = aggregate(started, &reports, params.failure_rate_threshold);

        let cleanup = {
            let dir = params.partition_dir.clone();
            tokio::task::spawn_blocking(move || cleanup_partitions(&dir, &partitions))
                .await
                .context("Cleanup task failed")?
        };

        self.hooks
            .on_run_end(run_id, aggregation.status, &aggregation.statistics);

        Ok(RunReport {
            run_id,
            status: aggregation.status,
            plan,
            duration_ms: aggregation.statistics.duration_ms().unwrap_or_default(),
            statistics: aggregation.statistics,
            partitions: reports,
            failure_rate: aggregation.failure_rate,
            threshold_exceeded: aggregation.threshold_exceeded,
            failure_log: params.failure_log.clone(),
            failure_log_rows: failures.rows(),
            partition_dir_removed: cleanup.dir_removed,
        })
    }
}
