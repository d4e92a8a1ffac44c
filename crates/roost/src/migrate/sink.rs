//! Import representation and sinks.

use crate::error::Result;
use serde_json::json;
use std::io::Write;

/// One label of a time series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelPair {
    /// Label name.
    pub name: String,
    /// Label value.
    pub value: String,
}

/// A fully materialized time series ready for import.
///
/// `timestamps` and `values` are parallel arrays of equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    /// Metric name, including any resolution/aggregate suffix.
    pub name: String,
    /// Labels other than `__name__`.
    pub labels: Vec<LabelPair>,
    /// Sample timestamps in milliseconds.
    pub timestamps: Vec<i64>,
    /// Sample values.
    pub values: Vec<f64>,
}

/// Destination for migrated series.
///
/// This is the importer boundary: implementations decide where series go
/// (a file, a network client, an in-memory buffer) and how they are
/// buffered.
pub trait ImportSink {
    /// Accepts one series for import.
    fn input(&mut self, series: TimeSeries) -> Result<()>;

    /// Flushes whatever the sink buffered. Called once after the last
    /// series.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink writing the line-delimited JSON import format:
/// one `{"metric": {...}, "values": [...], "timestamps": [...]}` document
/// per line.
pub struct JsonLinesSink<W: Write> {
    out: W,
    series_written: u64,
}

impl<W: Write> JsonLinesSink<W> {
    /// Creates a sink writing to `out`.
    pub fn new(out: W) -> Self {
        Self {
            out,
            series_written: 0,
        }
    }

    /// Number of series written so far.
    pub fn series_written(&self) -> u64 {
        self.series_written
    }

    /// Consumes the sink, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ImportSink for JsonLinesSink<W> {
    fn input(&mut self, series: TimeSeries) -> Result<()> {
        let mut metric = serde_json::Map::with_capacity(series.labels.len() + 1);
        metric.insert("__name__".to_string(), json!(series.name));
        for label in &series.labels {
            metric.insert(label.name.clone(), json!(label.value));
        }
        let line = json!({
            "metric": metric,
            "values": series.values,
            "timestamps": series.timestamps,
        });
        serde_json::to_writer(&mut self.out, &line)?;
        self.out.write_all(b"\n")?;
        self.series_written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Sink collecting series in memory, for tests and small exports.
#[derive(Debug, Default)]
pub struct VecSink {
    /// Every series received, in input order.
    pub series: Vec<TimeSeries>,
}

impl VecSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ImportSink for VecSink {
    fn input(&mut self, series: TimeSeries) -> Result<()> {
        self.series.push(series);
        Ok(())
    }
}
