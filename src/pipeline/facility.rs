//! The sink registry behind every log call.
//!
//! A [`Facility`] owns the registered sinks, the severity threshold and the
//! delivery mode. [`FacilityLayer`] plugs it into a `tracing` subscriber.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::level_filters::LevelFilter;
use tracing::subscriber::Interest;
use tracing::{Event, Level, Metadata, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::errors::SetupError;
use crate::models::record::{severity, severity_code};
use crate::models::LogRecord;
use crate::pipeline::pool::WorkerPool;
use crate::pipeline::sink::Sink;

enum Delivery {
    Sync,
    Pooled(WorkerPool),
}

fn threshold_code(filter: LevelFilter) -> u32 {
    match filter.into_level() {
        Some(level) => severity_code(&level),
        None => u32::MAX,
    }
}

fn threshold_filter(code: u32) -> LevelFilter {
    match code {
        c if c <= severity::TRACE => LevelFilter::TRACE,
        c if c <= severity::DEBUG => LevelFilter::DEBUG,
        c if c <= severity::INFO => LevelFilter::INFO,
        c if c <= severity::WARNING => LevelFilter::WARN,
        c if c <= severity::ERROR => LevelFilter::ERROR,
        _ => LevelFilter::OFF,
    }
}

pub struct Facility {
    threshold: AtomicU32,
    sinks: RwLock<Vec<Arc<Sink>>>,
    delivery: RwLock<Delivery>,
}

impl Default for Facility {
    fn default() -> Self {
        Self::new()
    }
}

impl Facility {
    /// An empty facility: no sinks, INFO threshold, synchronous delivery.
    pub fn new() -> Self {
        Self {
            threshold: AtomicU32::new(severity::INFO),
            sinks: RwLock::new(Vec::new()),
            delivery: RwLock::new(Delivery::Sync),
        }
    }

    /// Wraps the facility in a layer for a `tracing_subscriber::Registry`.
    pub fn layer(self: &Arc<Self>) -> FacilityLayer {
        FacilityLayer {
            facility: self.clone(),
        }
    }

    pub fn set_threshold(&self, filter: LevelFilter) {
        self.threshold.store(threshold_code(filter), Ordering::Relaxed);
    }

    pub fn threshold(&self) -> LevelFilter {
        threshold_filter(self.threshold.load(Ordering::Relaxed))
    }

    /// Whether records at `level` pass the threshold.
    pub fn enabled(&self, level: &Level) -> bool {
        severity_code(level) >= self.threshold.load(Ordering::Relaxed)
    }

    /// Registers a sink. Sinks are never removed.
    pub fn add_sink(&self, sink: Sink) -> Arc<Sink> {
        let sink = Arc::new(sink);
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink.clone());
        sink
    }

    pub fn sinks(&self) -> Vec<Arc<Sink>> {
        self.sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Switches between synchronous delivery (`0`) and a worker pool of
    /// `size` threads. Returns once every record queued on the replaced pool
    /// has been delivered; records other threads log during the switch may
    /// be written ahead of that backlog.
    pub fn set_pool_size(&self, size: usize) -> Result<(), SetupError> {
        if self.pool_size() == size {
            return Ok(());
        }
        let next = match size {
            0 => Delivery::Sync,
            n => Delivery::Pooled(WorkerPool::new(n)?),
        };

        let previous = {
            let mut delivery = self
                .delivery
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *delivery, next)
        };
        // Joins the old workers once their queues are empty. The lock is
        // released first so sinks that log from a worker can still dispatch.
        drop(previous);
        Ok(())
    }

    pub fn pool_size(&self) -> usize {
        match &*self.delivery.read().unwrap_or_else(PoisonError::into_inner) {
            Delivery::Sync => 0,
            Delivery::Pooled(pool) => pool.size(),
        }
    }

    /// Hands `record` to every sink. Synchronous delivery returns once all
    /// sinks have written; pooled delivery returns once it is queued.
    pub fn dispatch(&self, record: LogRecord) {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        if sinks.is_empty() {
            return;
        }

        let delivery = self
            .delivery
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match &*delivery {
            Delivery::Sync => {
                for sink in sinks.iter() {
                    sink.deliver(&record);
                }
            }
            Delivery::Pooled(pool) => {
                let record = Arc::new(record);
                for (lane, sink) in sinks.iter().enumerate() {
                    pool.submit(lane, sink.clone(), record.clone());
                }
            }
        }
    }

    /// Waits until every record dispatched so far has been written.
    pub fn flush(&self) {
        if let Delivery::Pooled(pool) =
            &*self.delivery.read().unwrap_or_else(PoisonError::into_inner)
        {
            pool.flush();
        }
    }
}

/// `tracing_subscriber` layer feeding events into a [`Facility`].
#[derive(Clone)]
pub struct FacilityLayer {
    facility: Arc<Facility>,
}

impl FacilityLayer {
    pub fn facility(&self) -> &Arc<Facility> {
        &self.facility
    }
}

impl<S> Layer<S> for FacilityLayer
where
    S: Subscriber,
{
    // The threshold can change after callsites are registered, so interest
    // is never cached.
    fn register_callsite(&self, _metadata: &'static Metadata<'static>) -> Interest {
        Interest::sometimes()
    }

    fn enabled(&self, metadata: &Metadata<'_>, _ctx: Context<'_, S>) -> bool {
        !metadata.is_event() || self.facility.enabled(metadata.level())
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let record = LogRecord::from_event(event);
        let allowed = record
            .level
            .map_or(true, |code| code >= self.facility.threshold.load(Ordering::Relaxed));
        if allowed {
            self.facility.dispatch(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::filter::schema_filter;
    use crate::pipeline::formatter::default_formatter;
    use crate::pipeline::sink::Destination;
    use std::io::{self, Write};
    use std::sync::Mutex;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn with_facility(facility: &Arc<Facility>, f: impl FnOnce()) {
        let subscriber = tracing_subscriber::registry().with(facility.layer());
        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn threshold_round_trips_through_codes() {
        let facility = Facility::new();
        assert_eq!(facility.threshold(), LevelFilter::INFO);
        for filter in [
            LevelFilter::TRACE,
            LevelFilter::DEBUG,
            LevelFilter::WARN,
            LevelFilter::ERROR,
            LevelFilter::OFF,
        ] {
            facility.set_threshold(filter);
            assert_eq!(facility.threshold(), filter);
        }
    }

    #[test]
    fn records_below_threshold_reach_no_sink() {
        let facility = Arc::new(Facility::new());
        let console = Buffer::default();
        facility.add_sink(Sink::new(
            "console",
            default_formatter(),
            None,
            Destination::writer(console.clone()),
        ));

        with_facility(&facility, || {
            tracing::debug!("hidden");
            tracing::info!("shown");
            tracing::warn!("also shown");
        });

        let pid = std::process::id();
        assert_eq!(
            console.lines(),
            vec![
                format!("{} - INFO - shown", pid),
                format!("{} - WARNING - also shown", pid),
            ]
        );
    }

    #[test]
    fn lowering_the_threshold_takes_effect_immediately() {
        let facility = Arc::new(Facility::new());
        let console = Buffer::default();
        facility.add_sink(Sink::new(
            "console",
            default_formatter(),
            None,
            Destination::writer(console.clone()),
        ));

        with_facility(&facility, || {
            tracing::debug!("first");
            facility.set_threshold(LevelFilter::DEBUG);
            tracing::debug!("second");
        });

        assert_eq!(console.lines().len(), 1);
        assert!(console.lines()[0].ends_with("DEBUG - second"));
    }

    #[test]
    fn every_sink_sees_every_record_subject_to_its_filter() {
        let facility = Arc::new(Facility::new());
        let console = Buffer::default();
        let file = Buffer::default();
        facility.add_sink(Sink::new(
            "console",
            default_formatter(),
            None,
            Destination::writer(console.clone()),
        ));
        facility.add_sink(Sink::new(
            "file",
            default_formatter(),
            Some(schema_filter("field1: string, field2: integer".parse().unwrap())),
            Destination::writer(file.clone()),
        ));

        with_facility(&facility, || {
            tracing::info!("plain text");
            tracing::info!(r#"{{"field1":"x","field2":1}}"#);
        });

        assert_eq!(console.lines().len(), 2);
        assert_eq!(file.lines().len(), 1);
        assert_eq!(file.lines()[0], console.lines()[1]);
    }

    #[test]
    fn pooled_delivery_preserves_order_after_flush() {
        let facility = Arc::new(Facility::new());
        let console = Buffer::default();
        facility.add_sink(Sink::new(
            "console",
            default_formatter(),
            None,
            Destination::writer(console.clone()),
        ));
        facility.set_pool_size(2).unwrap();
        assert_eq!(facility.pool_size(), 2);

        with_facility(&facility, || {
            for i in 0..100 {
                tracing::info!("record {}", i);
            }
        });
        facility.flush();

        let lines = console.lines();
        assert_eq!(lines.len(), 100);
        for (i, line) in lines.iter().enumerate() {
            assert!(line.ends_with(&format!("INFO - record {}", i)));
        }
    }

    #[test]
    fn switching_back_to_sync_drains_the_pool() {
        let facility = Arc::new(Facility::new());
        let console = Buffer::default();
        facility.add_sink(Sink::new(
            "console",
            default_formatter(),
            None,
            Destination::writer(console.clone()),
        ));
        facility.set_pool_size(1).unwrap();

        for i in 0..20 {
            facility.dispatch(LogRecord::new(&Level::INFO, format!("{}", i)));
        }
        facility.set_pool_size(0).unwrap();
        facility.dispatch(LogRecord::new(&Level::INFO, "sync"));

        let lines = console.lines();
        assert_eq!(lines.len(), 21);
        assert_eq!(lines[20], " - INFO - sync");
    }

    #[test]
    fn invalid_pool_size_keeps_current_delivery() {
        let facility = Facility::new();
        assert!(matches!(
            facility.set_pool_size(1000),
            Err(SetupError::InvalidPoolSize(1000))
        ));
        assert_eq!(facility.pool_size(), 0);
    }

    #[test]
    fn resizing_does_not_block_workers_that_read_the_facility() {
        let facility = Arc::new(Facility::new());
        let console = Buffer::default();
        let observer = facility.clone();
        facility.add_sink(Sink::new(
            "console",
            Arc::new(move |record: &LogRecord| {
                format!(
                    "{} {}\n",
                    observer.pool_size(),
                    record.message.as_deref().unwrap_or("")
                )
            }),
            None,
            Destination::writer(console.clone()),
        ));
        facility.set_pool_size(1).unwrap();

        for i in 0..50 {
            facility.dispatch(LogRecord::new(&Level::INFO, format!("{}", i)));
        }
        facility.set_pool_size(0).unwrap();
        facility.dispatch(LogRecord::new(&Level::INFO, "sync"));

        let lines = console.lines();
        assert_eq!(lines.len(), 51);
        assert_eq!(lines[50], "0 sync");
        for (i, line) in lines[..50].iter().enumerate() {
            assert!(line.ends_with(&format!(" {}", i)));
        }
    }
}
