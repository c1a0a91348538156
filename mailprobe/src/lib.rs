//! SMTP health-check probe.
//!
//! [`gather`] runs one scripted session against a mail server and reports
//! the outcome to an [`Accumulator`] as a single `smtp` measurement: the
//! `server`, `port` and `result` tags, plus `result_code`, `connect_time`,
//! `total_time` and a `<step>_code` field for each reply the server sent.

pub mod accumulator;
pub mod config;
pub mod gather;

pub use accumulator::{
    Accumulator, FieldValue, Fields, JsonLinesAccumulator, MemoryAccumulator, Metric, SinkError,
    Tags,
};
pub use config::{ConfigError, ProbeConfig};
pub use gather::{GatherError, MEASUREMENT, gather};
