//! # Multi-Step Benchmark Measurement Library
//!
//! Latency bookkeeping for benchmark operations that execute in several
//! discrete steps, such as a scan that reads a number of pages or a read that
//! fetches a value in chunks.
//!
//! ## Architecture Overview
//!
//! - `measurement`: the lock-free per-step aggregator and the run-wide pacing tracker
//! - `registry`: one aggregator per operation kind, sharing a pacing tracker
//! - `exporter`: the export sink contract and text/JSON sinks
//! - `workload`: a synthetic multi-threaded driver and the run coordinator
//! - `cli`: command-line arguments for the driver binary
//! - `logging`: tracing subscriber setup
//! - `utils`: formatting and validation helpers
//!
//! ## Usage Example
//!
//! ```rust
//! use multistep_bench::{MemoryExporter, MeasurementRegistry, MetricValue};
//!
//! # fn main() -> anyhow::Result<()> {
//! let registry = MeasurementRegistry::new();
//! let scan = registry.register("SCAN", 3)?;
//!
//! // Worker threads share `scan` through its `Arc`.
//! scan.record(100, 0)?;
//! scan.record(200, 0)?;
//! scan.record(50, 1)?;
//! scan.record_pacing_delay(20);
//!
//! // After every worker has been joined:
//! let mut sink = MemoryExporter::new();
//! registry.export_all(&mut sink)?;
//! assert_eq!(
//!     sink.value("SCAN", "step:0, operations: 2, Average Latency(us)"),
//!     Some(MetricValue::Int(150))
//! );
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod error;
pub mod exporter;
pub mod logging;

/// Per-step latency aggregation
///
/// Holds the hot path of the library: recording one step sample is two
/// relaxed atomic adds with no lock and no allocation.
pub mod measurement;

pub mod registry;
pub mod utils;

/// Synthetic workload execution
///
/// Spawns worker threads, simulates multi-step operations with pacing and
/// exports the aggregated results once every worker has been joined.
pub mod workload;

pub use error::MeasurementError;
pub use exporter::{
    ExportFormat, JsonExporter, MeasurementsExporter, MemoryExporter, MetricRow, MetricValue,
    TextExporter,
};
pub use measurement::{PacingTracker, StepAggregator, StepStats, StepSummary};
pub use registry::MeasurementRegistry;
pub use workload::{OperationSpec, RunCoordinator, RunReport, WorkloadConfig};

/// The current version of the benchmark, from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    /// Default operation kind, a four-page scan
    pub const OPERATION: &str = "SCAN:4";

    /// Operations executed by each worker thread
    pub const OPS_PER_THREAD: usize = 1000;

    /// Simulated step latency range in microseconds
    pub const MIN_STEP_LATENCY_US: u64 = 50;
    pub const MAX_STEP_LATENCY_US: u64 = 500;

    /// Think time between operations in microseconds
    pub const PACING_DELAY_US: u64 = 100;
}
