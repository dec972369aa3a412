//! Library exports for schemalog, shared between the binary and tests.
//!
//! Routes `tracing` (and bridged `log`) records to a console sink and an
//! optional file sink that only receives messages that are JSON objects
//! matching a declared [`Schema`](models::Schema).

pub mod config;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod utils;

pub use errors::{SchemaError, SetupError};
pub use models::{LogRecord, Schema};
pub use pipeline::{flush_logging, setup_logging, LoggingOptions};
