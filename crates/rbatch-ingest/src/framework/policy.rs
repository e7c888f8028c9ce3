//! Retry / skip / fatal classification
//!
//! Pure functions only: no I/O, no shared state. Callers pass the number of
//! attempts already made so the retry bound can be applied.

use std::time::Duration;

use super::types::Outcome;
use crate::error::{ErrorKind, IngestError, Result};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 200;
const MAX_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry,
    Skip,
    Fatal,
}

/// Classify an error kind, ignoring attempt counts
///
/// Unclassified errors are skipped unless `strict` is set, in which case they
/// abort the partition instead of being written off as bad data.
pub fn classify(kind: ErrorKind, strict: bool) -> Decision {
    match kind {
        ErrorKind::ResourceFatal | ErrorKind::Io | ErrorKind::SchemaMismatch => Decision::Fatal,
        ErrorKind::TransientData => Decision::Retry,
        ErrorKind::Parse | ErrorKind::Coercion | ErrorKind::Constraint => Decision::Skip,
        ErrorKind::Unclassified if strict => Decision::Fatal,
        ErrorKind::Unclassified => Decision::Skip,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total executions allowed for one unit of work, first attempt included
    pub max_attempts: u32,
    pub strict: bool,
    /// Base delay before a retry; doubles per attempt
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            strict: false,
            backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Decide what to do after `attempts` failed executions
    ///
    /// A retryable error that has used up its attempts degrades to Skip.
    pub fn decide(&self, error: &IngestError, attempts: u32) -> Decision {
        match classify(error.kind(), self.strict) {
            Decision::Retry if attempts >= self.max_attempts => Decision::Skip,
            decision => decision,
        }
    }

    /// Wrap an attempt's result into an [`Outcome`]
    pub fn outcome<T>(&self, result: Result<T>, attempts: u32) -> Outcome<T> {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(error) => match self.decide(&error, attempts) {
                Decision::Retry => Outcome::Retryable(error),
                Decision::Skip => Outcome::Skippable(error),
                Decision::Fatal => Outcome::Fatal(error),
            },
        }
    }

    /// Delay before attempt number `attempts + 1`
    pub fn delay_after(&self, attempts: u32) -> Duration {
        let factor = 1u32 << attempts.saturating_sub(1).min(16);
        self.backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}
