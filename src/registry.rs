use crate::error::MeasurementError;
use crate::exporter::MeasurementsExporter;
use crate::measurement::{PacingTracker, StepAggregator, StepSummary};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use tracing::{debug, info};

/// Run-scoped collection of step aggregators keyed by operation name
///
/// All aggregators created through one registry share a single
/// [`PacingTracker`]. The map lock is only taken when registering or looking
/// up an operation kind; recording through a held `Arc<StepAggregator>` never
/// touches it.
#[derive(Debug, Default)]
pub struct MeasurementRegistry {
    pacing: Arc<PacingTracker>,
    aggregators: RwLock<BTreeMap<String, Arc<StepAggregator>>>,
}

impl MeasurementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation kind, or return the existing aggregator if the
    /// name is already known with the same step count
    pub fn register(
        &self,
        name: &str,
        step_count: usize,
    ) -> Result<Arc<StepAggregator>, MeasurementError> {
        let mut aggregators = self.aggregators.write();

        if let Some(existing) = aggregators.get(name) {
            if existing.step_count() != step_count {
                return Err(MeasurementError::StepCountMismatch {
                    name: name.to_string(),
                    existing: existing.step_count(),
                    requested: step_count,
                });
            }
            return Ok(existing.clone());
        }

        let aggregator = Arc::new(StepAggregator::with_pacing(
            name,
            step_count,
            self.pacing.clone(),
        )?);
        aggregators.insert(name.to_string(), aggregator.clone());
        debug!("Registered operation {} with {} steps", name, step_count);
        Ok(aggregator)
    }

    pub fn get(&self, name: &str) -> Option<Arc<StepAggregator>> {
        self.aggregators.read().get(name).cloned()
    }

    /// Record a step latency by operation name
    pub fn record(&self, name: &str, latency_us: i64, step: usize) -> Result<(), MeasurementError> {
        let aggregators = self.aggregators.read();
        let aggregator = aggregators
            .get(name)
            .ok_or_else(|| MeasurementError::UnknownOperation(name.to_string()))?;
        aggregator.record(latency_us, step)
    }

    pub fn record_pacing_delay(&self, delay_us: u64) {
        self.pacing.record(delay_us);
    }

    /// Zero the run-wide pacing counters at the start of a run
    pub fn reset_pacing(&self) {
        self.pacing.reset();
    }

    pub fn pacing(&self) -> Arc<PacingTracker> {
        self.pacing.clone()
    }

    pub fn len(&self) -> usize {
        self.aggregators.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregators.read().is_empty()
    }

    /// Summaries of every registered operation, ordered by name
    pub fn summaries(&self) -> Vec<StepSummary> {
        self.aggregators
            .read()
            .values()
            .map(|aggregator| aggregator.summary())
            .collect()
    }

    /// Export every registered operation, ordered by name
    pub fn export_all(&self, exporter: &mut dyn MeasurementsExporter) -> io::Result<()> {
        let aggregators = self.aggregators.read();
        info!("Exporting measurements for {} operations", aggregators.len());
        for aggregator in aggregators.values() {
            aggregator.export(exporter)?;
        }
        Ok(())
    }
}
