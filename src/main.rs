//! # Multi-Step Benchmark - Main Entry Point
//!
//! 1. **Initialize logging**: tracing subscriber on stderr
//! 2. **Parse arguments**: clap-derived `Args`
//! 3. **Build config**: validated `WorkloadConfig`
//! 4. **Open the sink**: stdout or `--output-file`, text or JSON
//! 5. **Run**: workers record into the aggregators, then the report is exported
//! 6. **Summarize**: per-step table on stderr

use anyhow::{Context, Result};
use clap::Parser;
use multistep_bench::{
    cli::Args,
    logging,
    utils::{format_micros, format_table_row, format_table_separator},
    RunCoordinator, RunReport, WorkloadConfig,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use tracing::{error, info};

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    info!("Starting multi-step benchmark v{}", multistep_bench::VERSION);
    info!("Configuration: {:?}", args);

    let config = WorkloadConfig::from_args(&args)?;
    let coordinator = RunCoordinator::new(config);

    let writer: Box<dyn Write> = match args.output_file {
        Some(ref path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {:?}", path))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    let mut exporter = args.format.exporter(writer, coordinator.run_id());

    match coordinator.run(exporter.as_mut()) {
        Ok(report) => {
            print_summary(&report);
            if let Some(ref path) = args.output_file {
                info!("Report written to: {:?}", path);
            }
            Ok(())
        }
        Err(e) => {
            error!("Benchmark run failed: {:#}", e);
            Err(e)
        }
    }
}

fn print_summary(report: &RunReport) {
    let widths = [16, 6, 12, 14];
    eprintln!("{}", format_table_separator(&widths));
    eprintln!(
        "{}",
        format_table_row(&["Operation", "Step", "Operations", "Avg latency"], &widths)
    );
    eprintln!("{}", format_table_separator(&widths));
    for summary in &report.summaries {
        for step in &summary.steps {
            let avg = step
                .average_latency_us
                .map(format_micros)
                .unwrap_or_else(|| "-".to_string());
            eprintln!(
                "{}",
                format_table_row(
                    &[
                        summary.name.as_str(),
                        step.step.to_string().as_str(),
                        step.operations.to_string().as_str(),
                        avg.as_str(),
                    ],
                    &widths,
                )
            );
        }
    }
    eprintln!("{}", format_table_separator(&widths));
    eprintln!(
        "Run {}: {} operations in {}",
        report.run_id,
        report.total_operations,
        format_micros(report.elapsed.as_micros() as u64)
    );
}
