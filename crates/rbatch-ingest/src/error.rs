//! Error taxonomy for the ingestion core
//!
//! Every failure the pipeline can observe is folded into [`IngestError`].
//! The retry/skip policy only ever looks at [`IngestError::kind`], so the
//! mapping from concrete errors (I/O, sqlx, parsing) to a kind lives here.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Closed set of error kinds the policy classifies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Io,
    SchemaMismatch,
    Parse,
    Coercion,
    TransientData,
    Constraint,
    ResourceFatal,
    Unclassified,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Io => "io",
            ErrorKind::SchemaMismatch => "schema_mismatch",
            ErrorKind::Parse => "parse",
            ErrorKind::Coercion => "coercion",
            ErrorKind::TransientData => "transient_data",
            ErrorKind::Constraint => "constraint",
            ErrorKind::ResourceFatal => "resource_fatal",
            ErrorKind::Unclassified => "unclassified",
        }
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema mismatch in {path}: expected {expected} columns, found {found}")]
    SchemaMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("Malformed line {line}: {reason} ({raw})")]
    Parse {
        line: usize,
        raw: String,
        reason: String,
    },

    #[error("Cannot coerce column '{column}' value '{value}': {reason}")]
    Coercion {
        column: String,
        value: String,
        reason: String,
    },

    #[error("Transient data access error: {0}")]
    TransientData(String),

    #[error("Sink rejected row: {0}")]
    Constraint(String),

    #[error("Resource exhausted: {0}")]
    ResourceFatal(String),

    #[error("Unclassified error: {0}")]
    Unclassified(String),
}

impl IngestError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Io { .. } => ErrorKind::Io,
            IngestError::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            IngestError::Parse { .. } => ErrorKind::Parse,
            IngestError::Coercion { .. } => ErrorKind::Coercion,
            IngestError::TransientData(_) => ErrorKind::TransientData,
            IngestError::Constraint(_) => ErrorKind::Constraint,
            IngestError::ResourceFatal(_) => ErrorKind::ResourceFatal,
            IngestError::Unclassified(_) => ErrorKind::Unclassified,
        }
    }
}

impl From<sqlx::Error> for IngestError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => match db.code() {
                Some(code) => classify_sqlstate(&code, err.to_string()),
                None => IngestError::Unclassified(err.to_string()),
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::WorkerCrashed => IngestError::TransientData(err.to_string()),
            sqlx::Error::PoolClosed => IngestError::ResourceFatal(err.to_string()),
            _ => IngestError::Unclassified(err.to_string()),
        }
    }
}

/// Map a Postgres SQLSTATE onto the taxonomy
///
/// 08 connection exception, 40 transaction rollback, 53 insufficient
/// resources and 57P0x shutdown/cancel are worth another attempt. 22 data
/// exception and 23 integrity violation are the row's fault.
pub fn classify_sqlstate(code: &str, message: String) -> IngestError {
    match code.get(..2) {
        Some("08") | Some("40") | Some("53") => IngestError::TransientData(message),
        Some("57") if code.starts_with("57P0") => IngestError::TransientData(message),
        Some("22") | Some("23") => IngestError::Constraint(message),
        _ => IngestError::Unclassified(message),
    }
}
