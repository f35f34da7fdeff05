//! # Utility Functions and Helper Module
//!
//! Helpers shared by the workload driver and the command-line front end.
//!
//! ## Key Functionality Categories
//!
//! - **Identification**: Unique run identifiers for reports
//! - **Formatting**: Human-readable display of microsecond latencies
//! - **Validation**: Workload parameter validation with clear error messages
//! - **System Information**: CPU detection for default thread counts
//! - **Display Helpers**: Plain-text table rendering for console summaries
//!
//! ## Usage Examples
//!
//! ```rust
//! use multistep_bench::utils::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! assert_eq!(format_micros(1500), "1.50ms");
//!
//! validate_step_count("SCAN", 4)?;
//! validate_threads(8)?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use uuid::Uuid;

/// Upper bound on worker threads accepted from the command line
pub const MAX_THREADS: usize = 1024;

/// Upper bound on steps declared for a single operation kind
pub const MAX_STEPS: usize = 4096;

/// Generate a unique identifier for a benchmark run
///
/// Returns a UUID v4 string. The identifier is attached to JSON reports and
/// log lines so results from concurrent runs can be told apart.
///
/// ## Thread Safety
///
/// Safe to call concurrently; every call returns a distinct identifier.
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Format a microsecond value in a human-readable way
///
/// ## Unit Selection Logic
///
/// - **Microseconds**: < 1,000 µs (e.g., "750us")
/// - **Milliseconds**: < 1,000,000 µs (e.g., "1.50ms")
/// - **Seconds**: everything larger (e.g., "2.25s")
///
/// ## Examples
///
/// ```rust
/// # use multistep_bench::utils::format_micros;
/// assert_eq!(format_micros(750), "750us");
/// assert_eq!(format_micros(2500), "2.50ms");
/// assert_eq!(format_micros(2_250_000), "2.25s");
/// ```
pub fn format_micros(us: u64) -> String {
    if us < 1_000 {
        format!("{}us", us)
    } else if us < 1_000_000 {
        format!("{:.2}ms", us as f64 / 1_000.0)
    } else {
        format!("{:.2}s", us as f64 / 1_000_000.0)
    }
}

/// Validate the number of steps declared for an operation kind
///
/// ## Validation Rules
///
/// - **Minimum**: 1 step; an operation with no steps records nothing
/// - **Maximum**: [`MAX_STEPS`]; each step costs two atomic counters
pub fn validate_step_count(name: &str, steps: usize) -> Result<()> {
    if steps == 0 {
        anyhow::bail!("Operation '{}' must have at least one step", name);
    }
    if steps > MAX_STEPS {
        anyhow::bail!(
            "Operation '{}' declares {} steps (maximum {})",
            name,
            steps,
            MAX_STEPS
        );
    }
    Ok(())
}

/// Validate the number of worker threads
pub fn validate_threads(threads: usize) -> Result<()> {
    if threads == 0 {
        anyhow::bail!("Thread count cannot be zero");
    }
    if threads > MAX_THREADS {
        anyhow::bail!("Thread count {} is too high (maximum {})", threads, MAX_THREADS);
    }
    Ok(())
}

/// Validate a simulated step latency range in microseconds
///
/// The range is inclusive; `min == max` produces a constant latency.
pub fn validate_latency_range(min_us: u64, max_us: u64) -> Result<()> {
    if min_us > max_us {
        anyhow::bail!(
            "Minimum step latency {}us exceeds maximum {}us",
            min_us,
            max_us
        );
    }
    Ok(())
}

/// Validate a probability in `[0.0, 1.0]`
pub fn validate_rate(name: &str, rate: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&rate) {
        anyhow::bail!("{} must be between 0.0 and 1.0, got {}", name, rate);
    }
    Ok(())
}

/// Get recommended worker count based on available CPU cores
///
/// Uses the number of logical cores reported by `num_cpus`, capped at 8 to
/// keep default runs from saturating large machines.
pub fn get_recommended_threads() -> usize {
    num_cpus::get().clamp(1, 8)
}

/// Render one table row
///
/// ```rust
/// # use multistep_bench::utils::format_table_row;
/// assert_eq!(format_table_row(&["SCAN", "4"], &[6, 3]), "| SCAN   | 4   |");
/// ```
pub fn format_table_row(columns: &[&str], widths: &[usize]) -> String {
    let mut row = String::from("|");
    for (i, column) in columns.iter().enumerate() {
        let width = widths.get(i).copied().unwrap_or(10);
        row.push_str(&format!(" {:width$} |", column, width = width));
    }
    row
}

/// Render a table separator matching `widths`
///
/// ```text
/// +--------+-----+
/// | SCAN   | 4   |
/// +--------+-----+
/// ```
pub fn format_table_separator(widths: &[usize]) -> String {
    let mut line = String::from("+");
    for &width in widths {
        line.push_str(&"-".repeat(width + 2));
        line.push('+');
    }
    line
}
