use std::collections::BTreeMap;
use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::SchemaError;
use crate::models::Schema;

/// LoggingConfig controls how the console and file sinks are assembled.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, JsonSchema)]
pub struct LoggingConfig {
    /// Severity threshold: "trace", "debug", "info", "warn", "error" or "off".
    #[serde(default = "default_level")]
    pub level: String,
    /// Line format for both sinks: "plain" or "json".
    #[serde(default = "default_format")]
    pub format: String,
    /// File receiving schema-matching records. No file sink when absent.
    #[serde(default)]
    pub logfile: Option<PathBuf>,
    /// File rotation: "never", "minutely", "hourly" or "daily".
    #[serde(default = "default_rotation")]
    pub rotation: String,
    /// Delivery workers. 0 writes on the calling thread.
    #[serde(default)]
    pub pool_size: usize,
    /// Shape a message must have to reach the file sink.
    #[serde(default)]
    pub schema: Option<SchemaConfig>,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "plain".to_string()
}

fn default_rotation() -> String {
    "never".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            logfile: None,
            rotation: default_rotation(),
            pool_size: 0,
            schema: None,
        }
    }
}

/// A schema written either inline (`"field1: string, field2: integer"`) or
/// as a map of field name to type (`note?: string` marks an optional field).
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, JsonSchema)]
#[serde(untagged)]
pub enum SchemaConfig {
    Declaration(String),
    Fields(BTreeMap<String, String>),
}

impl SchemaConfig {
    pub fn to_schema(&self) -> Result<Schema, SchemaError> {
        match self {
            SchemaConfig::Declaration(declaration) => declaration.parse(),
            SchemaConfig::Fields(fields) => Schema::from_declarations(fields),
        }
    }
}
