pub mod record;
pub mod schema;

pub use record::{level_name, severity, severity_code, LogRecord};
pub use schema::{FieldKind, FieldSpec, Schema, ValidationError};
