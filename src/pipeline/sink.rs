use std::any::Any;
use std::fmt;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::errors::SetupError;
use crate::models::LogRecord;
use crate::pipeline::filter::RecordFilter;
use crate::pipeline::formatter::Formatter;

const FAILURE_REPORT_INTERVAL: Duration = Duration::from_secs(30);

/// Rate limit for failure reports on stderr.
#[derive(Debug, Default)]
struct ReportWindow {
    started_at: Option<Instant>,
    suppressed: u64,
}

impl ReportWindow {
    /// `Some(suppressed)` when a report may go out now, `None` when it is
    /// counted against the open window instead.
    fn admit(&mut self, now: Instant, interval: Duration) -> Option<u64> {
        match self.started_at {
            Some(started) if now.duration_since(started) < interval => {
                self.suppressed += 1;
                None
            }
            _ => {
                self.started_at = Some(now);
                Some(std::mem::take(&mut self.suppressed))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

/// Where a sink's lines go.
pub enum Destination {
    Stdout,
    Stderr,
    File(RollingFileAppender),
    Writer(Box<dyn Write + Send>),
}

impl Destination {
    /// Opens `path` for appending, creating the file and its parent
    /// directories when missing. With a rotation other than
    /// `Rotation::NEVER` the file name gets a date suffix.
    pub fn file(path: &Path, rotation: Rotation) -> Result<Self, SetupError> {
        let file_name = path
            .file_name()
            .ok_or_else(|| SetupError::LogFileName(path.to_path_buf()))?;
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let appender = RollingFileAppender::builder()
            .rotation(rotation)
            .filename_prefix(file_name.to_string_lossy())
            .build(directory)
            .map_err(|source| SetupError::LogFile {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Destination::File(appender))
    }

    pub fn writer(writer: impl Write + Send + 'static) -> Self {
        Destination::Writer(Box::new(writer))
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        match self {
            Destination::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(line.as_bytes())?;
                out.flush()
            }
            Destination::Stderr => {
                let mut err = io::stderr().lock();
                err.write_all(line.as_bytes())?;
                err.flush()
            }
            Destination::File(appender) => {
                appender.write_all(line.as_bytes())?;
                appender.flush()
            }
            Destination::Writer(writer) => {
                writer.write_all(line.as_bytes())?;
                writer.flush()
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Destination::Stdout => "stdout",
            Destination::Stderr => "stderr",
            Destination::File(_) => "file",
            Destination::Writer(_) => "writer",
        }
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// A formatter, an optional filter and the destination they feed.
///
/// The destination is only ever touched through [`Sink::deliver`], which
/// serializes writers behind the sink's own lock.
pub struct Sink {
    name: String,
    formatter: Formatter,
    filter: Option<RecordFilter>,
    destination: Mutex<Destination>,
    delivered: AtomicU64,
    write_errors: AtomicU64,
    reports: Mutex<ReportWindow>,
}

impl Sink {
    pub fn new(
        name: impl Into<String>,
        formatter: Formatter,
        filter: Option<RecordFilter>,
        destination: Destination,
    ) -> Self {
        Self {
            name: name.into(),
            formatter,
            filter,
            destination: Mutex::new(destination),
            delivered: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            reports: Mutex::new(ReportWindow::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the filter lets `record` through. Sinks without a filter accept everything.
    pub fn accepts(&self, record: &LogRecord) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(record))
    }

    /// Filters, formats and writes one record. Returns whether a line was written.
    ///
    /// Failures never reach the log call. A write error or a panicking
    /// filter or formatter is counted and reported on stderr at most once
    /// per interval, and the sink keeps taking records.
    pub fn deliver(&self, record: &LogRecord) -> bool {
        let rendered = panic::catch_unwind(AssertUnwindSafe(|| {
            self.accepts(record).then(|| (self.formatter)(record))
        }));
        let line = match rendered {
            Ok(Some(line)) => line,
            Ok(None) => return false,
            Err(payload) => {
                self.report_failure(&format!("panicked: {}", panic_message(&*payload)));
                return false;
            }
        };

        let result = self
            .destination
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_line(&line);

        match result {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.report_failure(&format!("failed to write: {}", e));
                false
            }
        }
    }

    fn report_failure(&self, reason: &str) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
        let admitted = self
            .reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .admit(Instant::now(), FAILURE_REPORT_INTERVAL);
        if let Some(suppressed) = admitted {
            eprintln!(
                "schemalog: sink '{}' {} ({} similar errors suppressed)",
                self.name, reason, suppressed
            );
        }
    }

    /// Number of lines written so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Number of records lost to write errors or panics so far.
    pub fn write_errors(&self) -> u64 {
        self.write_errors.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("name", &self.name)
            .field("filtered", &self.filter.is_some())
            .field("delivered", &self.delivered())
            .field("write_errors", &self.write_errors())
            .finish()
    }
}
