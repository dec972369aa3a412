use std::sync::Arc;

use serde_json::Value;

use crate::models::{LogRecord, Schema};

/// Decides whether a record is delivered to a sink.
pub type RecordFilter = Arc<dyn Fn(&LogRecord) -> bool + Send + Sync>;

/// Accepts a record only when its message is a JSON object satisfying
/// `schema`. Every parse or validation failure is a plain `false`.
pub fn schema_filter(schema: Schema) -> RecordFilter {
    Arc::new(move |record: &LogRecord| message_matches(&schema, record))
}

/// Shared body of [`schema_filter`], usable without allocating a filter.
pub fn message_matches(schema: &Schema, record: &LogRecord) -> bool {
    let Some(raw) = record.message.as_deref() else {
        return false;
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => schema.accepts(&value),
        Err(_) => false,
    }
}

/// Rejects everything. Used for a file sink configured with neither a
/// schema nor a filter.
pub fn reject_all() -> RecordFilter {
    Arc::new(|_: &LogRecord| false)
}
