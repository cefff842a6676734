use std::fs;
use std::io::BufWriter;

use taskscope::analysis::DurationStats;
use taskscope::domain::{TaskUid, TickFrequency};
use taskscope::export::ChromeTraceExporter;
use taskscope::server::Reconstructor;
use taskscope_common::TaskEvent;

fn reconstructed() -> Reconstructor {
    let mut state = Reconstructor::new(TickFrequency::MICROS);
    for (uid, group, start, stop, name) in [
        (11, Some(10), 1_000, 3_000, "load"),
        (12, Some(10), 3_000, 8_000, "transform"),
        (10, None, 500, 9_000, "pipeline"),
    ] {
        let mut event = TaskEvent::new(uid);
        if let Some(group) = group {
            event.group_uid = group;
        }
        event.started_at = start;
        event.stopped_at = stop;
        event.started_on_thread = 42;
        event.stopped_on_thread = 42;
        state.apply(event, name.to_string());
    }
    state
}

#[test]
fn test_export_creates_valid_json() {
    let exporter = ChromeTraceExporter::new();
    let mut buffer = Vec::new();

    exporter.export(&mut buffer).expect("Failed to export trace");

    let json_str = String::from_utf8(buffer).expect("Invalid UTF-8");
    let parsed: serde_json::Value = serde_json::from_str(&json_str).expect("Invalid JSON");

    assert!(parsed.get("traceEvents").is_some());
    assert_eq!(parsed["displayTimeUnit"], "ms");
}

#[test]
fn test_export_to_file_uses_final_names() {
    let tasks = reconstructed().finish();
    let mut exporter = ChromeTraceExporter::new();
    exporter.add_reports(1, &tasks, TickFrequency::MICROS);
    assert_eq!(exporter.event_count(), 3);

    let file = tempfile::NamedTempFile::new().unwrap();
    exporter.export(BufWriter::new(file.reopen().unwrap())).unwrap();

    let parsed: serde_json::Value = serde_json::from_str(&fs::read_to_string(file.path()).unwrap()).unwrap();
    let events = parsed["traceEvents"].as_array().unwrap();

    let transform = events.iter().find(|e| e["name"] == "pipeline/transform").expect("child with group prefix");
    assert_eq!(transform["ph"], "X");
    assert_eq!(transform["tid"], 42);
    // Relative to the pipeline start at tick 500
    assert_eq!(transform["ts"], 2500.0);
    assert_eq!(transform["dur"], 5000.0);
    assert_eq!(transform["args"]["group"], 10);

    let metadata: Vec<_> = events.iter().filter(|e| e["ph"] == "M").collect();
    assert_eq!(metadata.len(), 1);
    assert_eq!(metadata[0]["args"]["name"], "Thread 42");
}

#[test]
fn test_summary_over_reconstructed_tasks() {
    let state = reconstructed();
    let mut stats = DurationStats::new();
    stats.extend(&state.finish());

    let summaries = stats.summaries();
    assert_eq!(summaries[0].name, "pipeline");
    assert!((summaries[0].total_ms - 8.5).abs() < 1e-9);
    assert_eq!(state.full_name(TaskUid(11)).as_deref(), Some("pipeline/load"));
}
