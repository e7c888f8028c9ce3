//! Policy-guarded batch writes
//!
//! A batch goes to the sink as one statement-sized unit. Transient failures
//! re-run the same batch with backoff; once retries are exhausted, or for a
//! skippable error, the batch is replayed one record at a time so only the
//! offending records land in the failure log.

use std::sync::Arc;
use tracing::{debug, warn};

use super::failure::FailureRecorder;
use super::policy::RetryPolicy;
use super::sink::RecordSink;
use super::types::{Outcome, Record};
use crate::error::Result;
use crate::schema::TableSchema;

/// Counters produced by one `write_batch` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub written: u64,
    pub skipped: u64,
    pub committed: u64,
    pub rolled_back: u64,
}

#[derive(Clone)]
pub struct BatchWriter {
    sink: Arc<dyn RecordSink>,
    schema: Arc<TableSchema>,
    policy: RetryPolicy,
    failures: Arc<FailureRecorder>,
}

impl BatchWriter {
    pub fn new(
        sink: Arc<dyn RecordSink>,
        schema: Arc<TableSchema>,
        policy: RetryPolicy,
        failures: Arc<FailureRecorder>,
    ) -> Self {
        Self {
            sink,
            schema,
            policy,
            failures,
        }
    }

    /// Write one batch, replaying per record if the batch cannot commit
    ///
    /// Counters are added to `summary` as units commit or roll back, so a
    /// fatal error still leaves the work done before it accounted for.
    /// Returns `Err` only for a fatal error.
    pub async fn write_batch(&self, batch: &[Record], summary: &mut WriteSummary) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        match self.attempt(batch, summary).await {
            Outcome::Success(rows) => summary.written += rows,
            Outcome::Fatal(e) => return Err(e),
            Outcome::Skippable(e) | Outcome::Retryable(e) => {
                debug!(
                    size = batch.len(),
                    kind = e.kind().as_str(),
                    error = %e,
                    "Batch rejected, replaying record by record"
                );
                self.replay(batch, summary).await?;
            },
        }

        Ok(())
    }

    async fn replay(&self, batch: &[Record], summary: &mut WriteSummary) -> Result<()> {
        for record in batch {
            match self.attempt(std::slice::from_ref(record), summary).await {
                Outcome::Success(rows) => summary.written += rows,
                Outcome::Fatal(e) => return Err(e),
                Outcome::Skippable(e) | Outcome::Retryable(e) => {
                    summary.skipped += 1;
                    self.failures.record(record, &e);
                },
            }
        }
        Ok(())
    }

    /// Run `records` as one unit until it commits or the policy gives up
    ///
    /// Never returns `Retryable`.
    async fn attempt(&self, records: &[Record], summary: &mut WriteSummary) -> Outcome<u64> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.policy.outcome(self.insert(records).await, attempts) {
                Outcome::Success(rows) => {
                    summary.committed += 1;
                    return Outcome::Success(rows);
                },
                Outcome::Retryable(e) => {
                    summary.rolled_back += 1;
                    let delay = self.policy.delay_after(attempts);
                    warn!(
                        attempt = attempts,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        size = records.len(),
                        error = %e,
                        "Transient write failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                },
                other => {
                    summary.rolled_back += 1;
                    return other;
                },
            }
        }
    }

    async fn insert(&self, records: &[Record]) -> Result<u64> {
        let rows = records
            .iter()
            .map(|record| self.schema.coerce_row(record.values()))
            .collect::<Result<Vec<_>>>()?;
        self.sink.insert_rows(&self.schema, &rows).await
    }
}
