//! Logging configuration and initialization
//!
//! Every RBatch binary installs exactly one global `tracing` subscriber at
//! startup through [`init_logging`]. Library code only ever uses the
//! `tracing` macros with structured fields:
//!
//! ```rust
//! use tracing::{info, warn};
//!
//! let partition = 3;
//! info!(partition, read = 20_000u64, "Partition finished");
//! warn!(failure_rate = 7.5, "Failure rate above threshold");
//! ```
//!
//! Output always goes to stdout. Setting a log directory additionally writes
//! a daily-rolling file through a non-blocking appender; the returned
//! [`WorkerGuard`] must be held until shutdown so buffered lines are flushed.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Minimum severity that reaches the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    fn as_tracing(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(anyhow::anyhow!("Invalid log level: {}", other)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line format for every layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow::anyhow!("Invalid log format: {}", other)),
        }
    }
}

/// Rolling file destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFile {
    pub dir: PathBuf,
    /// File name prefix, e.g. "rbatch-ingest" -> "rbatch-ingest.2025-01-18"
    pub prefix: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Also write to a daily-rolling file when set
    pub file: Option<LogFile>,
    /// Extra `EnvFilter` directives such as `sqlx=warn`
    pub directives: Vec<String>,
    pub thread_ids: bool,
    pub location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
            file: None,
            directives: vec!["sqlx=warn".to_string()],
            thread_ids: true,
            location: false,
        }
    }
}

impl LogConfig {
    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }

    /// Load configuration from environment variables
    ///
    /// - `LOG_LEVEL`: trace, debug, info, warn, error
    /// - `LOG_FORMAT`: text, json
    /// - `LOG_DIR`: enables the rolling file output in this directory
    /// - `LOG_FILE_PREFIX`: file prefix (default `rbatch`)
    /// - `LOG_FILTER`: comma-separated extra directives
    /// - `LOG_THREAD_IDS`, `LOG_LOCATION`: true/false
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Overlay any `LOG_*` variables that are set onto this configuration
    pub fn merge_env(mut self) -> Result<Self> {
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.level = level.parse()?;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.format = format.parse()?;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            let prefix = std::env::var("LOG_FILE_PREFIX")
                .ok()
                .or_else(|| self.file.as_ref().map(|f| f.prefix.clone()))
                .unwrap_or_else(|| "rbatch".to_string());
            self.file = Some(LogFile { dir: PathBuf::from(dir), prefix });
        }
        if let Ok(filter) = std::env::var("LOG_FILTER") {
            self.directives = split_directives(&filter);
        }
        if let Ok(val) = std::env::var("LOG_THREAD_IDS") {
            self.thread_ids = val.parse().unwrap_or(self.thread_ids);
        }
        if let Ok(val) = std::env::var("LOG_LOCATION") {
            self.location = val.parse().unwrap_or(self.location);
        }
        Ok(self)
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::builder()
            .with_default_directive(self.level.as_tracing().into())
            .from_env_lossy();

        for directive in &self.directives {
            filter = filter.add_directive(
                directive
                    .parse()
                    .with_context(|| format!("Invalid filter directive '{}'", directive))?,
            );
        }

        Ok(filter)
    }

    fn fmt_layer<W>(&self, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .with_thread_ids(self.thread_ids)
            .with_file(self.location)
            .with_line_number(self.location)
            .with_span_events(FmtSpan::CLOSE);

        match self.format {
            LogFormat::Text => layer.boxed(),
            LogFormat::Json => layer.json().boxed(),
        }
    }
}

fn split_directives(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fluent builder for [`LogConfig`]
#[derive(Default)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn file(mut self, dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        self.config.file = Some(LogFile {
            dir: dir.into(),
            prefix: prefix.into(),
        });
        self
    }

    pub fn directives(mut self, raw: &str) -> Self {
        self.config.directives = split_directives(raw);
        self
    }

    pub fn location(mut self, include: bool) -> Self {
        self.config.location = include;
        self
    }

    pub fn build(self) -> LogConfig {
        self.config
    }
}

/// Install the global subscriber
///
/// Call once at startup. Returns the file appender guard when file output is
/// enabled; dropping it stops the background flusher.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = config.env_filter()?;

    let mut layers: Vec<BoxedLayer> = vec![config.fmt_layer(std::io::stdout, true)];
    let mut guard = None;

    if let Some(file) = &config.file {
        std::fs::create_dir_all(&file.dir)
            .with_context(|| format!("Failed to create log directory {}", file.dir.display()))?;
        let appender = tracing_appender::rolling::daily(&file.dir, &file.prefix);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        layers.push(config.fmt_layer(writer, false));
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!(" warning ".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_builder_sets_file_and_directives() {
        let config = LogConfig::builder()
            .level(LogLevel::Debug)
            .format(LogFormat::Json)
            .file("/var/log/rbatch", "ingest")
            .directives("sqlx=warn, rbatch_ingest=trace,,")
            .build();

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(
            config.file,
            Some(LogFile {
                dir: PathBuf::from("/var/log/rbatch"),
                prefix: "ingest".to_string()
            })
        );
        assert_eq!(config.directives, vec!["sqlx=warn", "rbatch_ingest=trace"]);
    }

    #[test]
    fn test_invalid_directive_is_rejected() {
        let config = LogConfig::builder().directives("sqlx=notalevel").build();
        assert!(config.env_filter().is_err());
    }
}
