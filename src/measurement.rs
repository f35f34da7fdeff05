//! # Per-Step Latency Aggregation
//!
//! Multi-step operations (a scan that touches several pages, a chunked read)
//! report one latency sample per completed step. [`StepAggregator`] keeps a
//! running sum and sample count for every step of one operation kind and is
//! shared by all worker threads executing that kind.
//!
//! ## Concurrency
//!
//! Every counter is an independent atomic. Recording a sample is two relaxed
//! atomic updates with no lock and no allocation; sums saturate at `u64::MAX`
//! rather than wrap. The sum and count of a
//! step are not updated as a pair, so a concurrent reader could observe one
//! without the other; readers are expected to run only after every writer has
//! been joined, which provides the happens-before edge.
//!
//! ## Invalid Samples
//!
//! Negative latencies (clock steps, instrumentation bugs) are counted in a
//! separate counter and never reach the per-step sums.
//!
//! ## Pacing Delay
//!
//! Think time between operations is accumulated in a [`PacingTracker`] that is
//! shared by every aggregator of a run. The average reported by each
//! aggregator is therefore the run-wide average, not a per-kind one.

use crate::error::MeasurementError;
use crate::exporter::{MeasurementsExporter, MetricValue};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Label of the pacing delay row
pub const PACING_DELAY_LABEL: &str = "Sleep per next operations(us)";

/// Label of the invalid sample row
pub const NEGATIVE_LATENCY_LABEL: &str = "Negative Latency";

/// Label of the row reporting step `step`
pub fn step_label(step: usize, operations: u64) -> String {
    format!(
        "step:{}, operations: {}, Average Latency(us)",
        step, operations
    )
}

/// Run-wide accumulator of pacing (think time) delays
#[derive(Debug, Default)]
pub struct PacingTracker {
    delay_sum_us: AtomicU64,
    samples: AtomicU64,
}

impl PacingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one pacing interval
    pub fn record(&self, delay_us: u64) {
        saturating_add(&self.delay_sum_us, delay_us);
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero both counters. Only valid while no worker is recording.
    pub fn reset(&self) {
        self.delay_sum_us.store(0, Ordering::Relaxed);
        self.samples.store(0, Ordering::Relaxed);
    }

    pub fn total_delay_us(&self) -> u64 {
        self.delay_sum_us.load(Ordering::Relaxed)
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    /// Average delay per pacing interval, `None` before the first sample
    pub fn average_us(&self) -> Option<f64> {
        match self.samples() {
            0 => None,
            n => Some(self.total_delay_us() as f64 / n as f64),
        }
    }
}

/// Summary of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStats {
    pub step: usize,
    pub operations: u64,
    pub total_latency_us: u64,
    /// Truncated mean, `None` when the step has no valid samples
    pub average_latency_us: Option<u64>,
}

/// Point-in-time summary of an aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub name: String,
    pub steps: Vec<StepStats>,
    pub invalid_samples: u64,
    pub pacing_samples: u64,
    pub average_pacing_delay_us: Option<f64>,
}

impl StepSummary {
    /// Valid samples over all steps
    pub fn total_operations(&self) -> u64 {
        self.steps.iter().map(|s| s.operations).sum()
    }
}

/// Lock-free per-step latency accumulator for one operation kind
#[derive(Debug)]
pub struct StepAggregator {
    name: String,
    latency_sum_us: Box<[AtomicU64]>,
    sample_count: Box<[AtomicU64]>,
    invalid_samples: AtomicU64,
    pacing: Arc<PacingTracker>,
}

impl StepAggregator {
    /// Create an aggregator with its own, zeroed pacing tracker
    pub fn new(name: impl Into<String>, step_count: usize) -> Result<Self, MeasurementError> {
        Self::with_pacing(name, step_count, Arc::new(PacingTracker::new()))
    }

    /// Create an aggregator reporting pacing delay into a shared tracker
    pub fn with_pacing(
        name: impl Into<String>,
        step_count: usize,
        pacing: Arc<PacingTracker>,
    ) -> Result<Self, MeasurementError> {
        let name = name.into();
        if step_count == 0 {
            return Err(MeasurementError::InvalidStepCount { name });
        }

        Ok(Self {
            name,
            latency_sum_us: zeroed(step_count),
            sample_count: zeroed(step_count),
            invalid_samples: AtomicU64::new(0),
            pacing,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_count(&self) -> usize {
        self.sample_count.len()
    }

    pub fn invalid_samples(&self) -> u64 {
        self.invalid_samples.load(Ordering::Relaxed)
    }

    pub fn pacing(&self) -> &Arc<PacingTracker> {
        &self.pacing
    }

    /// Record the latency of one completed step.
    ///
    /// A negative latency is counted as invalid and leaves the step untouched.
    /// The step sum saturates at `u64::MAX` instead of wrapping.
    /// A step outside `[0, step_count)` is rejected without mutating anything.
    pub fn record(&self, latency_us: i64, step: usize) -> Result<(), MeasurementError> {
        let (sum, count) = match (self.latency_sum_us.get(step), self.sample_count.get(step)) {
            (Some(sum), Some(count)) => (sum, count),
            _ => {
                return Err(MeasurementError::StepOutOfRange {
                    name: self.name.clone(),
                    step,
                    step_count: self.step_count(),
                })
            }
        };

        if latency_us < 0 {
            self.invalid_samples.fetch_add(1, Ordering::Relaxed);
        } else {
            saturating_add(sum, latency_us as u64);
            count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Record time spent pacing before the next operation
    pub fn record_pacing_delay(&self, delay_us: u64) {
        self.pacing.record(delay_us);
    }

    /// Snapshot the current counters
    pub fn summary(&self) -> StepSummary {
        let steps = self
            .latency_sum_us
            .iter()
            .zip(self.sample_count.iter())
            .enumerate()
            .map(|(step, (sum, count))| {
                let total = sum.load(Ordering::Relaxed);
                let operations = count.load(Ordering::Relaxed);
                StepStats {
                    step,
                    operations,
                    total_latency_us: total,
                    average_latency_us: total.checked_div(operations),
                }
            })
            .collect();

        StepSummary {
            name: self.name.clone(),
            steps,
            invalid_samples: self.invalid_samples(),
            pacing_samples: self.pacing.samples(),
            average_pacing_delay_us: self.pacing.average_us(),
        }
    }

    /// Write this aggregator's rows to `exporter`.
    ///
    /// Must only be called once every recording thread has been joined.
    /// The pacing row is omitted when no pacing delay was recorded during the
    /// run; a step without valid samples is reported with an average of 0.
    pub fn export(&self, exporter: &mut dyn MeasurementsExporter) -> io::Result<()> {
        let summary = self.summary();

        match summary.average_pacing_delay_us {
            Some(avg) => exporter.write(&self.name, PACING_DELAY_LABEL, MetricValue::Float(avg))?,
            None => debug!("No pacing delay recorded, skipping pacing row for {}", self.name),
        }

        if summary.invalid_samples > 0 {
            exporter.write(
                &self.name,
                NEGATIVE_LATENCY_LABEL,
                MetricValue::Int(summary.invalid_samples),
            )?;
        }

        for stats in &summary.steps {
            exporter.write(
                &self.name,
                &step_label(stats.step, stats.operations),
                MetricValue::Int(stats.average_latency_us.unwrap_or(0)),
            )?;
        }

        Ok(())
    }
}

/// Lock-free add that sticks at `u64::MAX`
fn saturating_add(counter: &AtomicU64, value: u64) {
    // The closure always returns Some, so the update cannot fail.
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_add(value))
    });
}

fn zeroed(len: usize) -> Box<[AtomicU64]> {
    (0..len).map(|_| AtomicU64::new(0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::MemoryExporter;

    struct FailingExporter {
        writes: usize,
        fail_after: usize,
    }

    impl MeasurementsExporter for FailingExporter {
        fn write(&mut self, _: &str, _: &str, _: MetricValue) -> io::Result<()> {
            if self.writes == self.fail_after {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
            }
            self.writes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_zero_steps_rejected() {
        let err = StepAggregator::new("SCAN", 0).unwrap_err();
        assert_eq!(
            err,
            MeasurementError::InvalidStepCount {
                name: "SCAN".to_string()
            }
        );
    }

    #[test]
    fn test_record_accumulates_per_step() {
        let agg = StepAggregator::new("SCAN", 3).unwrap();
        agg.record(100, 0).unwrap();
        agg.record(200, 0).unwrap();
        agg.record(50, 1).unwrap();

        let summary = agg.summary();
        assert_eq!(summary.steps[0].operations, 2);
        assert_eq!(summary.steps[0].total_latency_us, 300);
        assert_eq!(summary.steps[0].average_latency_us, Some(150));
        assert_eq!(summary.steps[1].average_latency_us, Some(50));
        assert_eq!(summary.steps[2].operations, 0);
        assert_eq!(summary.steps[2].average_latency_us, None);
        assert_eq!(summary.total_operations(), 3);
    }

    #[test]
    fn test_average_is_truncated() {
        let agg = StepAggregator::new("READ", 1).unwrap();
        agg.record(10, 0).unwrap();
        agg.record(11, 0).unwrap();
        agg.record(11, 0).unwrap();
        assert_eq!(agg.summary().steps[0].average_latency_us, Some(10));
    }

    #[test]
    fn test_step_sum_saturates_instead_of_wrapping() {
        let agg = StepAggregator::new("SCAN", 2).unwrap();
        let mut previous = 0;
        for _ in 0..3 {
            agg.record(i64::MAX, 0).unwrap();
            let sum = agg.summary().steps[0].total_latency_us;
            assert!(sum >= previous);
            previous = sum;
        }

        let summary = agg.summary();
        assert_eq!(summary.steps[0].operations, 3);
        assert_eq!(summary.steps[0].total_latency_us, u64::MAX);
        assert_eq!(summary.steps[0].average_latency_us, Some(u64::MAX / 3));
        // Neighbouring steps are unaffected
        assert_eq!(summary.steps[1].total_latency_us, 0);
    }

    #[test]
    fn test_pacing_sum_saturates() {
        let pacing = PacingTracker::new();
        pacing.record(u64::MAX);
        pacing.record(10);
        assert_eq!(pacing.total_delay_us(), u64::MAX);
        assert_eq!(pacing.samples(), 2);
    }

    #[test]
    fn test_zero_latency_is_valid() {
        let agg = StepAggregator::new("READ", 1).unwrap();
        agg.record(0, 0).unwrap();
        assert_eq!(agg.invalid_samples(), 0);
        assert_eq!(agg.summary().steps[0].operations, 1);
    }

    #[test]
    fn test_negative_latency_counted_separately() {
        let agg = StepAggregator::new("SCAN", 2).unwrap();
        agg.record(-5, 0).unwrap();
        agg.record(-1, 1).unwrap();
        agg.record(100, 0).unwrap();

        let summary = agg.summary();
        assert_eq!(summary.invalid_samples, 2);
        assert_eq!(summary.steps[0].operations, 1);
        assert_eq!(summary.steps[0].average_latency_us, Some(100));
        assert_eq!(summary.steps[1].operations, 0);
        assert_eq!(summary.steps[1].total_latency_us, 0);
    }

    #[test]
    fn test_out_of_range_step_does_not_mutate() {
        let agg = StepAggregator::new("SCAN", 2).unwrap();
        let err = agg.record(10, 2).unwrap_err();
        assert_eq!(
            err,
            MeasurementError::StepOutOfRange {
                name: "SCAN".to_string(),
                step: 2,
                step_count: 2
            }
        );
        // Negative samples at a bad step are rejected too, not counted
        assert!(agg.record(-10, 7).is_err());

        let summary = agg.summary();
        assert_eq!(summary.total_operations(), 0);
        assert_eq!(summary.invalid_samples, 0);
        assert!(summary.steps.iter().all(|s| s.total_latency_us == 0));
    }

    #[test]
    fn test_pacing_shared_between_aggregators() {
        let pacing = Arc::new(PacingTracker::new());
        let scan = StepAggregator::with_pacing("SCAN", 1, pacing.clone()).unwrap();
        let read = StepAggregator::with_pacing("READ", 1, pacing.clone()).unwrap();

        scan.record_pacing_delay(10);
        read.record_pacing_delay(20);

        assert_eq!(scan.summary().average_pacing_delay_us, Some(15.0));
        assert_eq!(read.summary().average_pacing_delay_us, Some(15.0));
        assert_eq!(pacing.samples(), 2);
        assert_eq!(pacing.total_delay_us(), 30);
    }

    #[test]
    fn test_new_aggregator_starts_with_fresh_pacing() {
        let agg = StepAggregator::new("SCAN", 1).unwrap();
        assert_eq!(agg.pacing().samples(), 0);
        assert_eq!(agg.pacing().average_us(), None);
    }

    #[test]
    fn test_pacing_reset() {
        let pacing = PacingTracker::new();
        pacing.record(40);
        pacing.reset();
        assert_eq!(pacing.samples(), 0);
        assert_eq!(pacing.total_delay_us(), 0);
    }

    #[test]
    fn test_export_row_order_and_values() {
        let agg = StepAggregator::new("SCAN", 2).unwrap();
        agg.record_pacing_delay(30);
        agg.record(-3, 0).unwrap();
        agg.record(40, 0).unwrap();
        agg.record(60, 1).unwrap();

        let mut sink = MemoryExporter::new();
        agg.export(&mut sink).unwrap();

        let labels: Vec<&str> = sink.rows.iter().map(|r| r.measurement.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                PACING_DELAY_LABEL,
                NEGATIVE_LATENCY_LABEL,
                "step:0, operations: 1, Average Latency(us)",
                "step:1, operations: 1, Average Latency(us)",
            ]
        );
        assert!(sink.rows.iter().all(|r| r.metric == "SCAN"));
        assert_eq!(sink.rows[0].value, MetricValue::Float(30.0));
        assert_eq!(sink.rows[1].value, MetricValue::Int(1));
        assert_eq!(sink.rows[2].value, MetricValue::Int(40));
        assert_eq!(sink.rows[3].value, MetricValue::Int(60));
    }

    #[test]
    fn test_export_without_pacing_or_samples() {
        let agg = StepAggregator::new("SCAN", 1).unwrap();
        let mut sink = MemoryExporter::new();
        agg.export(&mut sink).unwrap();

        assert_eq!(sink.rows.len(), 1);
        assert_eq!(
            sink.value("SCAN", "step:0, operations: 0, Average Latency(us)"),
            Some(MetricValue::Int(0))
        );
    }

    #[test]
    fn test_export_propagates_sink_error() {
        let agg = StepAggregator::new("SCAN", 3).unwrap();
        agg.record(5, 0).unwrap();

        let mut sink = FailingExporter {
            writes: 0,
            fail_after: 1,
        };
        let err = agg.export(&mut sink).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(err.to_string(), "sink closed");
        assert_eq!(sink.writes, 1);
    }

    #[test]
    fn test_export_does_not_mutate() {
        let agg = StepAggregator::new("SCAN", 1).unwrap();
        agg.record(7, 0).unwrap();
        let before = agg.summary();
        agg.export(&mut MemoryExporter::new()).unwrap();
        assert_eq!(agg.summary(), before);
    }
}
