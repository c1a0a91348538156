//! Where probe results go.
//!
//! A probe reports one measurement per run as a set of tags (strings that
//! identify the series) and fields (the values). Sinks implement
//! [`Accumulator`]; the CLI writes JSON lines, tests collect in memory.

use std::{
    collections::BTreeMap,
    io::{self, Write},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::Serialize;
use thiserror::Error;

pub type Fields = BTreeMap<String, FieldValue>;
pub type Tags = BTreeMap<String, String>;

/// A single field value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Unsigned(u64),
    Integer(i64),
    Float(f64),
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        Self::Unsigned(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// One reported measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub name: String,
    pub tags: Tags,
    pub fields: Fields,
    /// Seconds since the Unix epoch at which the measurement was added.
    pub timestamp: u64,
}

impl Metric {
    #[must_use]
    pub fn new(name: impl Into<String>, fields: Fields, tags: Tags) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());

        Self {
            name: name.into(),
            tags,
            fields,
            timestamp,
        }
    }

    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn field(&self, key: &str) -> Option<FieldValue> {
        self.fields.get(key).copied()
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write measurement: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to encode measurement: {0}")]
    Json(#[from] serde_json::Error),
}

/// Receives measurements.
pub trait Accumulator {
    /// Adds a measurement named `measurement`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot store or emit the measurement.
    fn add_fields(
        &mut self,
        measurement: &str,
        fields: Fields,
        tags: Tags,
    ) -> Result<(), SinkError>;
}

/// Keeps every measurement in memory.
#[derive(Debug, Default)]
pub struct MemoryAccumulator {
    metrics: Vec<Metric>,
}

impl MemoryAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// The most recent measurement named `name`.
    #[must_use]
    pub fn last(&self, name: &str) -> Option<&Metric> {
        self.metrics.iter().rev().find(|metric| metric.name == name)
    }
}

impl Accumulator for MemoryAccumulator {
    fn add_fields(
        &mut self,
        measurement: &str,
        fields: Fields,
        tags: Tags,
    ) -> Result<(), SinkError> {
        self.metrics.push(Metric::new(measurement, fields, tags));
        Ok(())
    }
}

/// Writes each measurement as one JSON object per line.
pub struct JsonLinesAccumulator<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesAccumulator<W> {
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Accumulator for JsonLinesAccumulator<W> {
    fn add_fields(
        &mut self,
        measurement: &str,
        fields: Fields,
        tags: Tags,
    ) -> Result<(), SinkError> {
        let metric = Metric::new(measurement, fields, tags);
        serde_json::to_writer(&mut self.writer, &metric)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
