use crate::exporter::ExportFormat;
use crate::workload::OperationSpec;
use clap::Parser;
use std::path::PathBuf;

/// Multi-step benchmark driver - records per-step latency for multi-step operations
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Operation kinds to run as NAME:STEPS (repeatable, e.g. -O SCAN:4 -O READ:2)
    #[clap(
        short = 'O',
        long = "operation",
        value_parser = parse_operation,
        default_value = crate::defaults::OPERATION,
        help_heading = "Workload Options"
    )]
    pub operations: Vec<OperationSpec>,

    /// Number of worker threads (defaults to the CPU count, capped at 8)
    #[clap(short = 't', long, help_heading = "Workload Options")]
    pub threads: Option<usize>,

    /// Operations executed by each worker thread
    #[clap(short = 'n', long, default_value_t = crate::defaults::OPS_PER_THREAD, help_heading = "Workload Options")]
    pub ops_per_thread: usize,

    /// Lower bound of the simulated latency of one step, in microseconds
    #[clap(long, default_value_t = crate::defaults::MIN_STEP_LATENCY_US, help_heading = "Workload Options")]
    pub min_step_latency_us: u64,

    /// Upper bound of the simulated latency of one step, in microseconds
    #[clap(long, default_value_t = crate::defaults::MAX_STEP_LATENCY_US, help_heading = "Workload Options")]
    pub max_step_latency_us: u64,

    /// Think time inserted between two operations, in microseconds
    #[clap(long, default_value_t = crate::defaults::PACING_DELAY_US, help_heading = "Workload Options")]
    pub pacing_delay_us: u64,

    /// Probability of injecting a negative (clock anomaly) sample per step
    #[clap(long, default_value_t = 0.0, help_heading = "Workload Options")]
    pub negative_sample_rate: f64,

    /// Seed for the per-worker random generators
    #[clap(long, help_heading = "Workload Options")]
    pub seed: Option<u64>,

    /// Report format
    #[clap(short = 'f', long, value_enum, default_value_t = ExportFormat::Text, help_heading = "Output Options")]
    pub format: ExportFormat,

    /// Write the report to this file instead of stdout
    #[clap(short = 'o', long, help_heading = "Output Options")]
    pub output_file: Option<PathBuf>,

    /// Verbose output
    #[clap(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}

/// Parse a `NAME:STEPS` operation declaration
pub fn parse_operation(s: &str) -> Result<OperationSpec, String> {
    let (name, steps) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected NAME:STEPS, got '{}'", s))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(format!("operation name is empty in '{}'", s));
    }

    let steps: usize = steps
        .trim()
        .parse()
        .map_err(|e| format!("invalid step count in '{}': {}", s, e))?;
    if steps == 0 {
        return Err(format!("operation '{}' must have at least one step", name));
    }

    Ok(OperationSpec {
        name: name.to_string(),
        steps,
    })
}
