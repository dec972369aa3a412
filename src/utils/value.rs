use serde_json::Value;

/// Convert a recorded field value into single-line text.
///
/// Each control character becomes a space so a message can never break the
/// one-record-per-line output of the sinks.
pub fn value_to_string(value: Value) -> String {
    let raw = match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    };
    blank_control_chars(raw)
}

fn blank_control_chars(s: String) -> String {
    if s.chars().any(char::is_control) {
        s.chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect()
    } else {
        s
    }
}
