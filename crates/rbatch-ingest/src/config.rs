//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::framework::aggregator::DEFAULT_FAILURE_RATE_THRESHOLD;
use crate::framework::policy::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BACKOFF_MS};
use crate::framework::reader::resolve_encoding;
use crate::framework::splitter::DEFAULT_PARTITION_PREFIX;

// ============================================================================
// Database Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/rbatch";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 32;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

// ============================================================================
// Job Configuration Constants
// ============================================================================

/// Default staged source file.
pub const DEFAULT_INPUT_PATH: &str = "data/restaurant.csv";

/// Default directory for partition files.
pub const DEFAULT_PARTITION_DIR: &str = "data/partitioned";

/// Default directory for failure logs.
pub const DEFAULT_FAILURE_DIR: &str = "data/failure";

/// Default source encoding (windows-949 compatible).
pub const DEFAULT_ENCODING: &str = "euc-kr";

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub database: DatabaseConfig,
    pub job: JobConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Job configuration
///
/// `parallelism`, `batch_size` and `partition_size` override the tuner when
/// set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub input_path: PathBuf,
    pub partition_dir: PathBuf,
    pub failure_dir: PathBuf,
    pub partition_prefix: String,
    pub encoding: String,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub strict_mode: bool,
    pub failure_rate_threshold: f64,
    pub parallelism: Option<usize>,
    pub batch_size: Option<usize>,
    pub partition_size: Option<usize>,
}

impl IngestConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Build from an arbitrary variable source, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        IngestConfig {
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: parse_or(
                    &lookup,
                    "DATABASE_MAX_CONNECTIONS",
                    defaults.database.max_connections,
                ),
                min_connections: parse_or(
                    &lookup,
                    "DATABASE_MIN_CONNECTIONS",
                    defaults.database.min_connections,
                ),
                connect_timeout_secs: parse_or(
                    &lookup,
                    "DATABASE_CONNECT_TIMEOUT",
                    defaults.database.connect_timeout_secs,
                ),
                idle_timeout_secs: parse_or(
                    &lookup,
                    "DATABASE_IDLE_TIMEOUT",
                    defaults.database.idle_timeout_secs,
                ),
            },
            job: JobConfig {
                input_path: lookup("RBATCH_INPUT")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.job.input_path),
                partition_dir: lookup("RBATCH_PARTITION_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.job.partition_dir),
                failure_dir: lookup("RBATCH_FAILURE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.job.failure_dir),
                partition_prefix: lookup("RBATCH_PARTITION_PREFIX")
                    .unwrap_or(defaults.job.partition_prefix),
                encoding: lookup("RBATCH_ENCODING").unwrap_or(defaults.job.encoding),
                max_attempts: parse_or(&lookup, "RBATCH_MAX_ATTEMPTS", defaults.job.max_attempts),
                retry_backoff_ms: parse_or(
                    &lookup,
                    "RBATCH_RETRY_BACKOFF_MS",
                    defaults.job.retry_backoff_ms,
                ),
                strict_mode: parse_or(&lookup, "RBATCH_STRICT", defaults.job.strict_mode),
                failure_rate_threshold: parse_or(
                    &lookup,
                    "RBATCH_FAILURE_RATE_THRESHOLD",
                    defaults.job.failure_rate_threshold,
                ),
                parallelism: parse_opt(&lookup, "RBATCH_PARALLELISM"),
                batch_size: parse_opt(&lookup, "RBATCH_BATCH_SIZE"),
                partition_size: parse_opt(&lookup, "RBATCH_PARTITION_SIZE"),
            },
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.job.partition_prefix.trim().is_empty() {
            anyhow::bail!("Partition prefix cannot be empty");
        }

        if resolve_encoding(&self.job.encoding).is_none() {
            anyhow::bail!("Unknown source encoding '{}'", self.job.encoding);
        }

        if self.job.max_attempts == 0 {
            anyhow::bail!("max_attempts must be at least 1");
        }

        if !(0.0..=100.0).contains(&self.job.failure_rate_threshold) {
            anyhow::bail!(
                "Failure rate threshold must be a percentage, got {}",
                self.job.failure_rate_threshold
            );
        }

        for (name, value) in [
            ("parallelism", self.job.parallelism),
            ("batch_size", self.job.batch_size),
            ("partition_size", self.job.partition_size),
        ] {
            if value == Some(0) {
                anyhow::bail!("{} override must be greater than 0", name);
            }
        }

        if let Some(parallelism) = self.job.parallelism {
            if parallelism > self.database.max_connections as usize {
                tracing::warn!(
                    parallelism,
                    max_connections = self.database.max_connections,
                    "More workers than pooled connections - workers will wait on the pool"
                );
            }
        }

        Ok(())
    }
}

fn parse_opt<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key).and_then(|s| s.trim().parse().ok())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    parse_opt(lookup, key).unwrap_or(default)
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            job: JobConfig {
                input_path: PathBuf::from(DEFAULT_INPUT_PATH),
                partition_dir: PathBuf::from(DEFAULT_PARTITION_DIR),
                failure_dir: PathBuf::from(DEFAULT_FAILURE_DIR),
                partition_prefix: DEFAULT_PARTITION_PREFIX.to_string(),
                encoding: DEFAULT_ENCODING.to_string(),
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
                strict_mode: false,
                failure_rate_threshold: DEFAULT_FAILURE_RATE_THRESHOLD,
                parallelism: None,
                batch_size: None,
                partition_size: None,
            },
        }
    }
}
