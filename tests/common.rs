#![allow(dead_code)]

use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use schemalog::pipeline::Facility;
use schemalog::Schema;
use tracing_subscriber::layer::SubscriberExt;

/// In-memory console used in place of stdout.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Captured {
    pub fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .expect("console output should be UTF-8")
            .lines()
            .map(str::to_string)
            .collect()
    }
}

pub fn metric_schema() -> Schema {
    "field1: string, field2: integer"
        .parse()
        .expect("schema should parse")
}

pub fn file_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Runs `f` with `facility` as the thread's default subscriber.
pub fn with_facility(facility: &Arc<Facility>, f: impl FnOnce()) {
    let subscriber = tracing_subscriber::registry().with(facility.layer());
    tracing::subscriber::with_default(subscriber, f);
}

pub fn line(level: &str, message: &str) -> String {
    format!("{} - {} - {}", std::process::id(), level, message)
}
