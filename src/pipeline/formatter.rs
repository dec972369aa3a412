use std::sync::Arc;

use chrono::SecondsFormat;
use serde_json::{Map, Value};

use crate::models::record::{severity, LogRecord};

/// Turns a record into one output line, trailing newline included.
pub type Formatter = Arc<dyn Fn(&LogRecord) -> String + Send + Sync>;

/// `<process> - <LEVEL> - <message>\n`. Absent attributes render empty.
pub fn format_record(record: &LogRecord) -> String {
    let process = record.process.map(|p| p.to_string()).unwrap_or_default();
    let message = record.message.as_deref().unwrap_or_default();
    format!("{} - {} - {}\n", process, record.level_name(), message)
}

/// The default line formatter as a shareable [`Formatter`].
pub fn default_formatter() -> Formatter {
    Arc::new(format_record)
}

/// OTel-aligned severity number for a severity code.
fn severity_number(code: u32) -> u64 {
    match code {
        c if c <= severity::TRACE => 1,
        c if c <= severity::DEBUG => 5,
        c if c <= severity::INFO => 9,
        c if c <= severity::WARNING => 13,
        c if c <= severity::ERROR => 17,
        _ => 21,
    }
}

/// One OpenTelemetry-style JSON object per line.
pub fn format_record_json(record: &LogRecord) -> String {
    let mut attributes = record.fields.clone();
    if let Some(v) = attributes.remove("event_name") {
        attributes.insert("event.name".to_string(), v);
    }
    if let Some(v) = attributes.remove("event_domain") {
        attributes.insert("event.domain".to_string(), v);
    }
    if let Some(file) = &record.file {
        attributes.insert("code.filepath".to_string(), Value::from(file.as_str()));
    }
    if let Some(line) = record.line {
        attributes.insert("code.lineno".to_string(), Value::from(line));
    }
    if let Some(target) = &record.target {
        attributes.insert("code.target".to_string(), Value::from(target.as_str()));
    }
    if let Some(thread) = &record.thread {
        attributes.insert("thread.name".to_string(), Value::from(thread.as_str()));
    }

    let mut resource = Map::new();
    if let Some(process) = record.process {
        resource.insert("process.pid".to_string(), Value::from(process));
    }

    let mut root = Map::new();
    if let Some(timestamp) = record.timestamp {
        root.insert(
            "timestamp".to_string(),
            Value::from(timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
    }
    root.insert(
        "severity_text".to_string(),
        Value::from(record.level_name().into_owned()),
    );
    if let Some(code) = record.level {
        root.insert(
            "severity_number".to_string(),
            Value::from(severity_number(code)),
        );
    }
    root.insert(
        "body".to_string(),
        Value::from(record.message.clone().unwrap_or_default()),
    );
    root.insert("resource".to_string(), Value::Object(resource));
    root.insert("attributes".to_string(), Value::Object(attributes));

    // A Map of plain values always serializes; fall back to an empty line
    // rather than failing the log call.
    let mut line = serde_json::to_string(&Value::Object(root)).unwrap_or_default();
    line.push('\n');
    line
}

/// The JSON formatter as a shareable [`Formatter`].
pub fn json_formatter() -> Formatter {
    Arc::new(format_record_json)
}
