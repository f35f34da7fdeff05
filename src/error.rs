//! Error types for the measurement layer.
//!
//! Library code returns `MeasurementError` so callers can match on the
//! failure; the driver and binary wrap everything in `anyhow` with context.

use thiserror::Error;

/// Errors raised while registering or recording multi-step measurements
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeasurementError {
    #[error("operation '{name}' must declare at least one step")]
    InvalidStepCount { name: String },

    #[error("step {step} is out of range for operation '{name}' ({step_count} steps declared)")]
    StepOutOfRange {
        name: String,
        step: usize,
        step_count: usize,
    },

    #[error("operation '{name}' is already registered with {existing} steps, not {requested}")]
    StepCountMismatch {
        name: String,
        existing: usize,
        requested: usize,
    },

    #[error("operation '{0}' has not been registered")]
    UnknownOperation(String),
}
