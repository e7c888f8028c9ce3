//! Run-wide failure artifact
//!
//! Every worker shares one [`FailureRecorder`]. The dedup check and the file
//! append happen under the same lock, so a natural key is written at most
//! once no matter how many workers or retries report it.

use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, warn};

use super::types::Record;
use crate::error::{IngestError, Result};
use crate::schema::TableSchema;

#[derive(Default)]
struct FailureLedger {
    seen: HashSet<String>,
    writer: Option<csv::Writer<File>>,
    rows: u64,
}

pub struct FailureRecorder {
    path: PathBuf,
    header: Vec<&'static str>,
    ledger: Mutex<FailureLedger>,
}

impl FailureRecorder {
    pub fn new(path: impl Into<PathBuf>, schema: &TableSchema) -> Self {
        Self {
            path: path.into(),
            header: schema.labels(),
            ledger: Mutex::new(FailureLedger::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// (Re)create the artifact and write the header row
    ///
    /// Clears the dedup set, so call it once per run before any worker
    /// starts.
    pub fn initialize(&self) -> Result<()> {
        let mut ledger = self.lock();
        ledger.seen.clear();
        ledger.rows = 0;
        ledger.writer = Some(self.open()?);
        debug!(path = %self.path.display(), "Failure log initialised");
        Ok(())
    }

    /// Persist a permanently failed record
    ///
    /// First writer wins: returns `false` when the key was already recorded.
    /// I/O problems with the artifact are logged, never returned.
    pub fn record(&self, record: &Record, cause: &IngestError) -> bool {
        let mut ledger = self.lock();
        if !ledger.seen.insert(record.key().to_string()) {
            debug!(key = record.key(), "Duplicate skip ignored");
            return false;
        }

        warn!(
            key = record.key(),
            partition = record.partition(),
            line = record.line(),
            kind = cause.kind().as_str(),
            error = %cause,
            "Record skipped"
        );

        if ledger.writer.is_none() {
            match self.open() {
                Ok(writer) => ledger.writer = Some(writer),
                Err(e) => {
                    error!(error = %e, "Cannot open failure log, skipped record not persisted");
                    return true;
                },
            }
        }

        if let Some(writer) = ledger.writer.as_mut() {
            let written = writer
                .write_record(record.values())
                .and_then(|_| writer.flush().map_err(csv::Error::from));
            match written {
                Ok(()) => ledger.rows += 1,
                Err(e) => error!(
                    path = %self.path.display(),
                    key = record.key(),
                    error = %e,
                    "Failed to append to failure log"
                ),
            }
        }

        true
    }

    /// Rows written to the artifact so far, header excluded
    pub fn rows(&self) -> u64 {
        self.lock().rows
    }

    fn open(&self) -> Result<csv::Writer<File>> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| IngestError::io(parent, e))?;
        }

        let mut writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .from_path(&self.path)
            .map_err(|e| IngestError::io(&self.path, e.into()))?;
        writer
            .write_record(&self.header)
            .and_then(|_| writer.flush().map_err(csv::Error::from))
            .map_err(|e| IngestError::io(&self.path, e.into()))?;

        Ok(writer)
    }

    fn lock(&self) -> MutexGuard<'_, FailureLedger> {
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
