//! # Synthetic Workload Driver and Run Coordinator
//!
//! Drives multi-step operations from a pool of worker threads and feeds every
//! step latency and pacing interval into the measurement layer.
//!
//! ## Run Lifecycle
//!
//! 1. **Register**: one aggregator per configured operation kind
//! 2. **Reset**: zero the run-wide pacing tracker
//! 3. **Execute**: spawn workers in a `crossbeam` scope; each worker picks an
//!    operation kind, runs its steps, records each step, then paces
//! 4. **Join**: the scope joins every worker before returning, which is the
//!    barrier the aggregators rely on before they are read
//! 5. **Export**: write every aggregator to the sink and close it
//!
//! Step work is simulated by sleeping for a random duration inside the
//! configured range; the recorded latency is the measured elapsed time, not
//! the requested one.

use crate::cli::Args;
use crate::exporter::MeasurementsExporter;
use crate::measurement::{StepAggregator, StepSummary};
use crate::registry::MeasurementRegistry;
use crate::utils;
use anyhow::{anyhow, Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A multi-step operation kind and its declared number of steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSpec {
    pub name: String,
    pub steps: usize,
}

/// Validated workload parameters
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    pub operations: Vec<OperationSpec>,
    pub threads: usize,
    pub ops_per_thread: usize,
    pub min_step_latency_us: u64,
    pub max_step_latency_us: u64,
    pub pacing_delay: Duration,
    pub negative_sample_rate: f64,
    pub seed: u64,
}

impl WorkloadConfig {
    /// Build and validate a configuration from command-line arguments
    ///
    /// Missing thread count falls back to the recommended value for this
    /// machine; a missing seed is drawn at random and logged so a run can be
    /// replayed.
    pub fn from_args(args: &Args) -> Result<Self> {
        let seed = args.seed.unwrap_or_else(rand::random);
        let config = Self {
            operations: args.operations.clone(),
            threads: args.threads.unwrap_or_else(utils::get_recommended_threads),
            ops_per_thread: args.ops_per_thread,
            min_step_latency_us: args.min_step_latency_us,
            max_step_latency_us: args.max_step_latency_us,
            pacing_delay: Duration::from_micros(args.pacing_delay_us),
            negative_sample_rate: args.negative_sample_rate,
            seed,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.operations.is_empty() {
            anyhow::bail!("At least one operation kind must be configured");
        }
        for op in &self.operations {
            utils::validate_step_count(&op.name, op.steps)?;
        }
        utils::validate_threads(self.threads)?;
        utils::validate_latency_range(self.min_step_latency_us, self.max_step_latency_us)?;
        utils::validate_rate("Negative sample rate", self.negative_sample_rate)?;
        Ok(())
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub elapsed: Duration,
    pub total_operations: u64,
    pub pacing_samples: u64,
    pub summaries: Vec<StepSummary>,
}

/// Owns a run: registration, worker threads, join barrier and export
pub struct RunCoordinator {
    config: WorkloadConfig,
    run_id: String,
}

impl RunCoordinator {
    pub fn new(config: WorkloadConfig) -> Self {
        Self {
            config,
            run_id: utils::generate_run_id(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    /// Execute the workload and export the results to `exporter`
    pub fn run(&self, exporter: &mut dyn MeasurementsExporter) -> Result<RunReport> {
        let registry = MeasurementRegistry::new();
        let mut aggregators = Vec::with_capacity(self.config.operations.len());
        for op in &self.config.operations {
            let aggregator = registry
                .register(&op.name, op.steps)
                .with_context(|| format!("Failed to register operation {}", op.name))?;
            if !aggregators.iter().any(|a| Arc::ptr_eq(a, &aggregator)) {
                aggregators.push(aggregator);
            }
        }
        registry.reset_pacing();

        info!(
            "Run {}: {} threads x {} operations over {} operation kinds (seed {})",
            self.run_id,
            self.config.threads,
            self.config.ops_per_thread,
            aggregators.len(),
            self.config.seed
        );

        let start = Instant::now();
        let per_worker = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = (0..self.config.threads)
                .map(|worker_id| {
                    let config = &self.config;
                    let aggregators = &aggregators;
                    scope.spawn(move |_| run_worker(worker_id, config, aggregators))
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .map_err(|_| anyhow!("Worker thread panicked"))
                        .and_then(|result| result)
                })
                .collect::<Result<Vec<u64>>>()
        })
        .map_err(|_| anyhow!("Worker scope panicked"))?
        .context("Workload aborted")?;
        let elapsed = start.elapsed();

        let total_operations: u64 = per_worker.iter().sum();
        info!(
            "All workers finished: {} operations in {}",
            total_operations,
            utils::format_micros(elapsed.as_micros() as u64)
        );

        let summaries = registry.summaries();
        for summary in summaries.iter().filter(|s| s.invalid_samples > 0) {
            warn!(
                "{}: {} negative latency samples excluded from averages",
                summary.name, summary.invalid_samples
            );
        }

        registry
            .export_all(exporter)
            .context("Failed to export measurements")?;
        exporter.close().context("Failed to finalize report")?;

        Ok(RunReport {
            run_id: self.run_id.clone(),
            elapsed,
            total_operations,
            pacing_samples: registry.pacing().samples(),
            summaries,
        })
    }
}

/// Worker loop: returns the number of operations completed
fn run_worker(
    worker_id: usize,
    config: &WorkloadConfig,
    aggregators: &[Arc<StepAggregator>],
) -> Result<u64> {
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(worker_id as u64));
    let mut completed = 0u64;

    for _ in 0..config.ops_per_thread {
        let aggregator = aggregators
            .choose(&mut rng)
            .ok_or_else(|| anyhow!("No operation kinds registered"))?;

        execute_operation(aggregator, config, &mut rng)
            .with_context(|| format!("Worker {} failed", worker_id))?;
        pace(aggregator, config.pacing_delay);
        completed += 1;
    }

    debug!("Worker {} completed {} operations", worker_id, completed);
    Ok(completed)
}

/// Run every step of one operation and record its latency
fn execute_operation(
    aggregator: &StepAggregator,
    config: &WorkloadConfig,
    rng: &mut StdRng,
) -> Result<()> {
    for step in 0..aggregator.step_count() {
        let target_us = rng.gen_range(config.min_step_latency_us..=config.max_step_latency_us);

        let start = Instant::now();
        if target_us > 0 {
            thread::sleep(Duration::from_micros(target_us));
        }
        let measured_us = i64::try_from(start.elapsed().as_micros()).unwrap_or(i64::MAX);

        // Simulated clock anomaly: the sample comes out negative.
        let sample = if rng.gen_bool(config.negative_sample_rate) {
            anomalous_sample(measured_us)
        } else {
            measured_us
        };

        aggregator.record(sample, step)?;
    }
    Ok(())
}

/// Turn a measured latency into a strictly negative sample
fn anomalous_sample(measured_us: i64) -> i64 {
    (-1i64).saturating_sub(measured_us)
}

/// Sleep for the configured think time and record how long it actually took
fn pace(aggregator: &StepAggregator, delay: Duration) {
    let start = Instant::now();
    if !delay.is_zero() {
        thread::sleep(delay);
    }
    aggregator.record_pacing_delay(start.elapsed().as_micros() as u64);
}
