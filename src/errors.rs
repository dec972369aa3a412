//! Error types surfaced by setup and schema construction.
//!
//! Per-record failures never appear here: the schema filter swallows them and
//! answers `false`. Only configuration mistakes reach the caller.

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::pool::MAX_POOL_SIZE;

/// Errors raised while building a [`Schema`](crate::models::Schema).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("empty field declaration at position {0}")]
    EmptyField(usize),

    #[error("field declaration '{0}' is missing a ':' separator")]
    MissingSeparator(String),

    #[error("unknown field type '{kind}' for field '{field}'")]
    UnknownKind { field: String, kind: String },

    #[error("field '{0}' is declared more than once")]
    DuplicateField(String),

    #[error("JSON schema root must be an object schema: {0}")]
    NotAnObjectSchema(String),

    #[error("JSON schema reference '{0}' does not resolve to a definition")]
    UnresolvedReference(String),
}

/// Errors raised by `setup_logging` and configuration loading.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid pool size {0} (maximum {max})", max = MAX_POOL_SIZE)]
    InvalidPoolSize(usize),

    #[error("invalid logging level '{0}'. Valid values: trace, debug, info, warn, error, off")]
    InvalidLevel(String),

    #[error("invalid logging format '{0}'. Valid values: plain, json")]
    InvalidFormat(String),

    #[error("invalid rotation '{0}'. Valid values: never, minutely, hourly, daily")]
    InvalidRotation(String),

    #[error("cannot open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: tracing_appender::rolling::InitError,
    },

    #[error("log file path {0} has no file name")]
    LogFileName(PathBuf),

    #[error("failed to spawn delivery worker: {0}")]
    Worker(#[from] std::io::Error),

    #[error("invalid schema: {0}")]
    Schema(#[from] SchemaError),

    #[error("failed to load configuration: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("failed to install the global subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

impl From<figment::Error> for SetupError {
    fn from(e: figment::Error) -> Self {
        SetupError::Config(Box::new(e))
    }
}
