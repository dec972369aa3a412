//! Pipeline assembly: one console sink, an optional schema-filtered file sink.
//!
//! [`setup_logging`] configures the process-wide facility, installing the
//! global `tracing` subscriber on first use. Calling it again is additive:
//! new sinks are registered next to the existing ones and the threshold and
//! pool size take the latest values. [`Facility::configure`] applies the
//! same options to an explicit facility without touching global state.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tracing::level_filters::LevelFilter;
use tracing::{debug, warn};
use tracing_appender::rolling::Rotation;
use tracing_subscriber::prelude::*;

use crate::config::LoggingConfig;
use crate::errors::SetupError;
use crate::models::{LogRecord, Schema};
use crate::pipeline::facility::Facility;
use crate::pipeline::filter::{reject_all, schema_filter, RecordFilter};
use crate::pipeline::formatter::{default_formatter, json_formatter, Formatter};
use crate::pipeline::pool::MAX_POOL_SIZE;
use crate::pipeline::sink::{Destination, Sink};

/// Options accepted by [`setup_logging`].
pub struct LoggingOptions {
    /// File sink path. No file sink when `None`.
    pub logfile: Option<PathBuf>,
    /// 0 for synchronous delivery, otherwise the number of delivery workers.
    pub pool_size: usize,
    /// Line formatter for both sinks, [`crate::pipeline::format_record`] by default.
    pub formatter: Option<Formatter>,
    /// Builds the file sink's filter when no explicit `filter` is given.
    pub schema: Option<Schema>,
    /// Replaces the schema-derived filter entirely.
    pub filter: Option<RecordFilter>,
    pub level: LevelFilter,
    pub rotation: Rotation,
    /// Console destination. Defaults to stdout.
    pub console: Option<Destination>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            logfile: None,
            pool_size: 0,
            formatter: None,
            schema: None,
            filter: None,
            level: LevelFilter::INFO,
            rotation: Rotation::NEVER,
            console: None,
        }
    }
}

impl LoggingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.logfile = Some(path.into());
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&LogRecord) -> String + Send + Sync + 'static,
    {
        self.formatter = Some(Arc::new(formatter));
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&LogRecord) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    pub fn rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn console(mut self, destination: Destination) -> Self {
        self.console = Some(destination);
        self
    }

    /// Translates a loaded [`LoggingConfig`] into options.
    pub fn from_config(config: &LoggingConfig) -> Result<Self, SetupError> {
        let formatter = match config.format.trim().to_lowercase().as_str() {
            "plain" | "console" => default_formatter(),
            "json" => json_formatter(),
            _ => return Err(SetupError::InvalidFormat(config.format.clone())),
        };
        let schema = config
            .schema
            .as_ref()
            .map(|schema| schema.to_schema())
            .transpose()?;

        Ok(Self {
            logfile: config.logfile.clone(),
            pool_size: config.pool_size,
            formatter: Some(formatter),
            schema,
            filter: None,
            level: parse_level(&config.level)?,
            rotation: parse_rotation(&config.rotation)?,
            console: None,
        })
    }
}

/// Parses a level name as written in configuration files.
pub fn parse_level(level: &str) -> Result<LevelFilter, SetupError> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        "off" => Ok(LevelFilter::OFF),
        _ => Err(SetupError::InvalidLevel(level.to_string())),
    }
}

/// Parses a rotation name as written in configuration files.
pub fn parse_rotation(rotation: &str) -> Result<Rotation, SetupError> {
    match rotation.trim().to_lowercase().as_str() {
        "never" => Ok(Rotation::NEVER),
        "minutely" => Ok(Rotation::MINUTELY),
        "hourly" => Ok(Rotation::HOURLY),
        "daily" => Ok(Rotation::DAILY),
        _ => Err(SetupError::InvalidRotation(rotation.to_string())),
    }
}

impl Facility {
    /// Registers the console sink and, when a logfile is given, the filtered
    /// file sink, then applies the threshold and pool size.
    ///
    /// Everything that can fail is checked before the first sink is added.
    /// With neither `filter` nor `schema` the file sink rejects every record.
    pub fn configure(&self, options: LoggingOptions) -> Result<(), SetupError> {
        if options.pool_size > MAX_POOL_SIZE {
            return Err(SetupError::InvalidPoolSize(options.pool_size));
        }

        let file_destination = options
            .logfile
            .as_deref()
            .map(|path| Destination::file(path, options.rotation.clone()))
            .transpose()?;

        let formatter = options.formatter.unwrap_or_else(default_formatter);
        let unfiltered = options.filter.is_none() && options.schema.is_none();
        let filter = match (options.filter, options.schema) {
            (Some(filter), _) => filter,
            (None, Some(schema)) => schema_filter(schema),
            (None, None) => reject_all(),
        };

        self.set_threshold(options.level);
        self.add_sink(Sink::new(
            "console",
            formatter.clone(),
            None,
            options.console.unwrap_or(Destination::Stdout),
        ));

        if let (Some(destination), Some(path)) = (file_destination, options.logfile.as_ref()) {
            self.add_sink(Sink::new(
                format!("file:{}", path.display()),
                formatter,
                Some(filter),
                destination,
            ));
            if unfiltered {
                warn!(
                    event_name = "logging.setup.file_sink_rejects_all",
                    event_domain = "logging",
                    logfile = %path.display(),
                    "No schema or filter given; the file sink will not receive any record"
                );
            }
        }

        self.set_pool_size(options.pool_size)?;

        debug!(
            event_name = "logging.setup.configured",
            event_domain = "logging",
            sinks = self.sinks().len(),
            pool_size = options.pool_size,
            "Logging pipeline configured"
        );
        Ok(())
    }
}

static GLOBAL_FACILITY: OnceLock<Arc<Facility>> = OnceLock::new();
static INSTALL_LOCK: Mutex<()> = Mutex::new(());

/// The process-wide facility, installing the global subscriber (and the
/// `log` bridge) on first call.
pub fn global_facility() -> Result<Arc<Facility>, SetupError> {
    if let Some(facility) = GLOBAL_FACILITY.get() {
        return Ok(facility.clone());
    }

    let _guard = INSTALL_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(facility) = GLOBAL_FACILITY.get() {
        return Ok(facility.clone());
    }

    let facility = Arc::new(Facility::new());
    tracing_subscriber::registry()
        .with(facility.layer())
        .try_init()?;
    let _ = GLOBAL_FACILITY.set(facility.clone());
    Ok(facility)
}

/// Configures the process-wide pipeline. See the module docs for the
/// additive behavior of repeated calls.
pub fn setup_logging(options: LoggingOptions) -> Result<(), SetupError> {
    global_facility()?.configure(options)
}

/// [`setup_logging`] from a loaded configuration.
pub fn setup_from_config(config: &LoggingConfig) -> Result<(), SetupError> {
    setup_logging(LoggingOptions::from_config(config)?)
}

/// Blocks until every record logged so far has been written. Only matters
/// with a worker pool; call it before the process exits.
pub fn flush_logging() {
    if let Some(facility) = GLOBAL_FACILITY.get() {
        facility.flush();
    }
}
