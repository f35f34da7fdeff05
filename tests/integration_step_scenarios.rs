use multistep_bench::measurement::{step_label, NEGATIVE_LATENCY_LABEL, PACING_DELAY_LABEL};
use multistep_bench::{
    JsonExporter, MeasurementRegistry, MeasurementsExporter, MemoryExporter, MetricValue,
    StepAggregator, TextExporter,
};
use std::fs::File;
use std::io::{BufWriter, Read};
use std::sync::Arc;

#[test]
fn three_step_scan_reports_per_step_means() {
    let scan = StepAggregator::new("SCAN", 3).expect("create aggregator");
    scan.record(100, 0).unwrap();
    scan.record(200, 0).unwrap();
    scan.record(50, 1).unwrap();

    let mut sink = MemoryExporter::new();
    scan.export(&mut sink).unwrap();

    assert_eq!(sink.value("SCAN", &step_label(0, 2)), Some(MetricValue::Int(150)));
    assert_eq!(sink.value("SCAN", &step_label(1, 1)), Some(MetricValue::Int(50)));
    // A step nobody reached is still listed, with zero operations
    assert_eq!(sink.value("SCAN", &step_label(2, 0)), Some(MetricValue::Int(0)));
    assert_eq!(sink.value("SCAN", NEGATIVE_LATENCY_LABEL), None);
}

#[test]
fn negative_sample_is_counted_not_averaged() {
    let scan = StepAggregator::new("SCAN", 1).expect("create aggregator");
    scan.record(-5, 0).unwrap();
    scan.record(100, 0).unwrap();

    let mut sink = MemoryExporter::new();
    scan.export(&mut sink).unwrap();

    assert_eq!(
        sink.value("SCAN", NEGATIVE_LATENCY_LABEL),
        Some(MetricValue::Int(1))
    );
    assert_eq!(sink.value("SCAN", &step_label(0, 1)), Some(MetricValue::Int(100)));
}

#[test]
fn missing_pacing_samples_omit_the_pacing_row() {
    let scan = StepAggregator::new("SCAN", 2).expect("create aggregator");
    scan.record(10, 0).unwrap();

    let mut sink = MemoryExporter::new();
    scan.export(&mut sink).expect("export must not fail without pacing samples");

    assert_eq!(sink.value("SCAN", PACING_DELAY_LABEL), None);
    assert_eq!(sink.rows.len(), 2);
}

#[test]
fn pacing_total_is_shared_by_every_operation_kind() {
    let registry = MeasurementRegistry::new();
    let scan = registry.register("SCAN", 2).unwrap();
    let read = registry.register("READ", 1).unwrap();

    scan.record_pacing_delay(10);
    read.record_pacing_delay(20);

    assert_eq!(scan.summary().average_pacing_delay_us, Some(15.0));
    assert_eq!(read.summary().average_pacing_delay_us, Some(15.0));
    assert!(Arc::ptr_eq(scan.pacing(), read.pacing()));
}

#[test]
fn text_report_written_to_file() {
    let registry = MeasurementRegistry::new();
    let scan = registry.register("SCAN", 2).unwrap();
    scan.record(30, 0).unwrap();
    scan.record(-1, 1).unwrap();
    scan.record_pacing_delay(5);

    let file = tempfile::NamedTempFile::new().expect("create temp file");
    {
        let mut exporter = TextExporter::new(BufWriter::new(
            File::create(file.path()).expect("open temp file"),
        ));
        registry.export_all(&mut exporter).unwrap();
        exporter.close().unwrap();
    }

    let mut contents = String::new();
    File::open(file.path())
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(
        lines,
        vec![
            "[SCAN], Sleep per next operations(us), 5.00",
            "[SCAN], Negative Latency, 1",
            "[SCAN], step:0, operations: 1, Average Latency(us), 30",
            "[SCAN], step:1, operations: 0, Average Latency(us), 0",
        ]
    );
}

#[test]
fn json_report_lists_every_row() {
    let registry = MeasurementRegistry::new();
    registry.register("SCAN", 1).unwrap().record(42, 0).unwrap();
    registry.register("READ", 1).unwrap().record(8, 0).unwrap();
    registry.record_pacing_delay(4);

    let mut exporter = JsonExporter::with_run_id(Vec::new(), "integration");
    registry.export_all(&mut exporter).unwrap();
    exporter.close().unwrap();

    let report: serde_json::Value = serde_json::from_slice(&exporter.into_inner()).unwrap();
    let rows = report["measurements"].as_array().expect("measurements array");
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0]["metric"], "READ");
    assert_eq!(rows[0]["measurement"], PACING_DELAY_LABEL);
    assert_eq!(rows[1]["value"], 8);
    assert_eq!(rows[3]["value"], 42);
    assert_eq!(report["metadata"]["run_id"], "integration");
}
