//! # Measurement Export Sinks
//!
//! Aggregators report their results as a flat sequence of named rows. Each row
//! is addressed by a metric group (the operation kind, e.g. `SCAN`) and a
//! label within that group. The [`MeasurementsExporter`] trait is the only
//! contract an aggregator relies on; formatting and persistence belong to the
//! sink.
//!
//! ## Provided Sinks
//!
//! - [`TextExporter`]: one `[GROUP], label, value` line per row, written as
//!   rows arrive
//! - [`JsonExporter`]: buffers rows and writes a single JSON document with
//!   run metadata on [`MeasurementsExporter::close`]
//! - [`MemoryExporter`]: keeps rows in memory for inspection
//!
//! Sink errors are plain `std::io::Error` values so that callers can propagate
//! them unchanged.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};
use tracing::debug;

/// Value carried by a single exported row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(u64),
    Float(f64),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(v) => write!(f, "{}", v),
            MetricValue::Float(v) => write!(f, "{:.2}", v),
        }
    }
}

impl From<u64> for MetricValue {
    fn from(value: u64) -> Self {
        MetricValue::Int(value)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Float(value)
    }
}

/// One exported row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub metric: String,
    pub measurement: String,
    pub value: MetricValue,
}

/// Destination for exported measurement rows
pub trait MeasurementsExporter {
    /// Write one row. Errors must be returned as-is; the caller does not retry.
    fn write(&mut self, metric_group: &str, metric_label: &str, value: MetricValue)
        -> io::Result<()>;

    /// Finish the report. Called once after every aggregator has exported.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Output formats selectable from the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum ExportFormat {
    /// `[GROUP], label, value` lines
    #[clap(name = "text")]
    Text,

    /// A single JSON document with run metadata
    #[clap(name = "json")]
    Json,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Text => write!(f, "text"),
            ExportFormat::Json => write!(f, "json"),
        }
    }
}

impl ExportFormat {
    /// Build a boxed sink of this format over `writer`
    pub fn exporter<W: Write + 'static>(
        self,
        writer: W,
        run_id: &str,
    ) -> Box<dyn MeasurementsExporter> {
        match self {
            ExportFormat::Text => Box::new(TextExporter::new(writer)),
            ExportFormat::Json => Box::new(JsonExporter::with_run_id(writer, run_id)),
        }
    }
}

/// Line-oriented sink
pub struct TextExporter<W: Write> {
    writer: W,
}

impl<W: Write> TextExporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> MeasurementsExporter for TextExporter<W> {
    fn write(
        &mut self,
        metric_group: &str,
        metric_label: &str,
        value: MetricValue,
    ) -> io::Result<()> {
        writeln!(self.writer, "[{}], {}, {}", metric_group, metric_label, value)
    }

    fn close(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Run metadata attached to JSON reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub version: String,
    pub run_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub cpu_cores: usize,
}

/// Complete JSON report document
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonReport {
    pub metadata: ReportMetadata,
    pub measurements: Vec<MetricRow>,
}

/// Buffering JSON sink
pub struct JsonExporter<W: Write> {
    writer: W,
    run_id: String,
    rows: Vec<MetricRow>,
    closed: bool,
}

impl<W: Write> JsonExporter<W> {
    /// Create a JSON sink with a freshly generated run identifier
    pub fn new(writer: W) -> Self {
        Self::with_run_id(writer, &crate::utils::generate_run_id())
    }

    pub fn with_run_id(writer: W, run_id: &str) -> Self {
        Self {
            writer,
            run_id: run_id.to_string(),
            rows: Vec::new(),
            closed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> MeasurementsExporter for JsonExporter<W> {
    fn write(
        &mut self,
        metric_group: &str,
        metric_label: &str,
        value: MetricValue,
    ) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "JSON report has already been written",
            ));
        }
        self.rows.push(MetricRow {
            metric: metric_group.to_string(),
            measurement: metric_label.to_string(),
            value,
        });
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }

        let report = JsonReport {
            metadata: ReportMetadata {
                version: crate::VERSION.to_string(),
                run_id: self.run_id.clone(),
                timestamp: chrono::Utc::now(),
                cpu_cores: num_cpus::get(),
            },
            measurements: std::mem::take(&mut self.rows),
        };

        serde_json::to_writer_pretty(&mut self.writer, &report)?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        self.closed = true;

        debug!(
            "Wrote JSON report with {} rows",
            report.measurements.len()
        );
        Ok(())
    }
}

/// In-memory sink
#[derive(Debug, Default)]
pub struct MemoryExporter {
    pub rows: Vec<MetricRow>,
}

impl MemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the value of a row by group and label
    pub fn value(&self, metric_group: &str, metric_label: &str) -> Option<MetricValue> {
        self.rows
            .iter()
            .find(|r| r.metric == metric_group && r.measurement == metric_label)
            .map(|r| r.value)
    }

    /// Rows belonging to one group, in write order
    pub fn group(&self, metric_group: &str) -> Vec<&MetricRow> {
        self.rows
            .iter()
            .filter(|r| r.metric == metric_group)
            .collect()
    }
}

impl MeasurementsExporter for MemoryExporter {
    fn write(
        &mut self,
        metric_group: &str,
        metric_label: &str,
        value: MetricValue,
    ) -> io::Result<()> {
        self.rows.push(MetricRow {
            metric: metric_group.to_string(),
            measurement: metric_label.to_string(),
            value,
        });
        Ok(())
    }
}
