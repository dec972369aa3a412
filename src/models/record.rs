use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level};
use tracing_log::NormalizeEvent;

use crate::utils::value::value_to_string;

/// Numeric severity codes, ordered so that a larger code is more severe.
pub mod severity {
    pub const TRACE: u32 = 5;
    pub const DEBUG: u32 = 10;
    pub const INFO: u32 = 20;
    pub const WARNING: u32 = 30;
    pub const ERROR: u32 = 40;
    pub const CRITICAL: u32 = 50;
}

/// Maps a `tracing` level to its numeric severity code.
pub fn severity_code(level: &Level) -> u32 {
    match *level {
        Level::TRACE => severity::TRACE,
        Level::DEBUG => severity::DEBUG,
        Level::INFO => severity::INFO,
        Level::WARN => severity::WARNING,
        Level::ERROR => severity::ERROR,
    }
}

/// Human readable name for a severity code. Unknown codes render as `Level <n>`.
pub fn level_name(code: u32) -> Cow<'static, str> {
    match code {
        severity::TRACE => Cow::Borrowed("TRACE"),
        severity::DEBUG => Cow::Borrowed("DEBUG"),
        severity::INFO => Cow::Borrowed("INFO"),
        severity::WARNING => Cow::Borrowed("WARNING"),
        severity::ERROR => Cow::Borrowed("ERROR"),
        severity::CRITICAL => Cow::Borrowed("CRITICAL"),
        other => Cow::Owned(format!("Level {}", other)),
    }
}

/// A read-only snapshot of one log call.
///
/// Every attribute is optional: records captured from `tracing` fill all of
/// them, but formatters and filters must cope with any of them missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogRecord {
    pub message: Option<String>,
    pub level: Option<u32>,
    pub process: Option<u32>,
    pub timestamp: Option<DateTime<Utc>>,
    pub target: Option<String>,
    pub thread: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    /// Structured fields other than `message`, in call-site order.
    pub fields: Map<String, Value>,
}

impl LogRecord {
    /// Builds a record with only a message and a level, as a formatter or
    /// filter would see from a minimal log call.
    pub fn new(level: &Level, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            level: Some(severity_code(level)),
            ..Default::default()
        }
    }

    /// Captures a `tracing` event. Events bridged from the `log` crate are
    /// normalized so their target and location are the original ones.
    pub fn from_event(event: &Event<'_>) -> Self {
        let normalized = event.normalized_metadata();
        let metadata = match normalized.as_ref() {
            Some(metadata) => metadata,
            None => event.metadata(),
        };

        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let current = std::thread::current();
        Self {
            message: visitor.message,
            level: Some(severity_code(metadata.level())),
            process: Some(std::process::id()),
            timestamp: Some(Utc::now()),
            target: Some(metadata.target().to_string()),
            thread: current.name().map(str::to_string),
            file: metadata.file().map(str::to_string),
            line: metadata.line(),
            fields: visitor.fields,
        }
    }

    /// Severity name of this record, empty when the level is absent.
    pub fn level_name(&self) -> Cow<'static, str> {
        self.level.map(level_name).unwrap_or(Cow::Borrowed(""))
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl RecordVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(value_to_string(value));
        } else if !field.name().starts_with("log.") {
            // `log.*` fields are bridge bookkeeping already folded into the metadata
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for RecordVisitor {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, Value::from(format!("{:?}", value)));
    }
}
