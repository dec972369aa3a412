//! The logging pipeline: records flow from `tracing` through the
//! [`Facility`] to each registered [`Sink`], filtered and formatted on the way.

pub mod facility;
pub mod filter;
pub mod formatter;
pub mod pool;
pub mod setup;
pub mod sink;

pub use facility::{Facility, FacilityLayer};
pub use filter::{message_matches, reject_all, schema_filter, RecordFilter};
pub use formatter::{
    default_formatter, format_record, format_record_json, json_formatter, Formatter,
};
pub use pool::{WorkerPool, MAX_POOL_SIZE, QUEUE_CAPACITY};
pub use setup::{
    flush_logging, global_facility, parse_level, parse_rotation, setup_from_config, setup_logging,
    LoggingOptions,
};
pub use sink::{Destination, Sink};
