use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap};
use std::io::Write;

use crate::domain::TickFrequency;
use crate::server::TaskReport;

/// Chrome Trace Event format
/// Format reference: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU/preview
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChromeTraceEvent {
    /// Full task name
    name: String,
    /// Category for filtering/coloring
    cat: String,
    /// Phase: "X" = complete, "M" = metadata
    ph: String,
    /// Timestamp in microseconds
    ts: f64,
    /// Duration in microseconds, complete events only
    #[serde(skip_serializing_if = "Option::is_none")]
    dur: Option<f64>,
    /// Connection the task arrived on
    pid: u32,
    /// Thread that started the task
    tid: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<HashMap<String, JsonValue>>,
}

/// Chrome Trace Format container
#[derive(Debug, Serialize)]
struct ChromeTrace {
    #[serde(rename = "traceEvents")]
    trace_events: Vec<ChromeTraceEvent>,
    #[serde(rename = "displayTimeUnit")]
    display_time_unit: String,
}

/// Timeline exporter for reconstructed tasks
///
/// Every task becomes one complete ("X") event. Timestamps are relative to
/// the earliest start tick seen per connection, since producer clocks share
/// no epoch.
#[derive(Debug, Default)]
pub struct ChromeTraceExporter {
    events: Vec<ChromeTraceEvent>,
    /// First start tick per connection
    origins: HashMap<u32, u32>,
}

impl ChromeTraceExporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one task of connection `conn_id`
    ///
    /// `frequency` is the tick rate of that connection's producer.
    pub fn add_report(&mut self, conn_id: u32, report: &TaskReport, frequency: TickFrequency) {
        let origin = *self.origins.entry(conn_id).or_insert(report.started_at);
        // Tasks that started before the first one added wrap to a huge offset;
        // clamp them to the origin instead.
        let ts_ms = if report.started_at >= origin { frequency.to_millis(origin, report.started_at) } else { 0.0 };

        let mut args = HashMap::new();
        args.insert("uid".to_string(), serde_json::json!(report.uid.0));
        if let Some(group) = report.group {
            args.insert("group".to_string(), serde_json::json!(group.0));
        }
        args.insert("started_on_core".to_string(), serde_json::json!(report.started_on_core.to_string()));
        args.insert("stopped_on_core".to_string(), serde_json::json!(report.stopped_on_core.to_string()));
        if report.stopped_on_thread != report.started_on_thread {
            args.insert("stopped_on_thread".to_string(), serde_json::json!(report.stopped_on_thread));
        }

        self.events.push(ChromeTraceEvent {
            name: report.full_name.clone(),
            cat: "task".to_string(),
            ph: "X".to_string(),
            ts: ts_ms * 1000.0,
            dur: Some(report.duration_ms * 1000.0),
            pid: conn_id,
            tid: report.started_on_thread,
            args: Some(args),
        });
    }

    /// Add every task of one connection
    pub fn add_reports<'a>(
        &mut self,
        conn_id: u32,
        reports: impl IntoIterator<Item = &'a TaskReport>,
        frequency: TickFrequency,
    ) {
        for report in reports {
            self.add_report(conn_id, report, frequency);
        }
    }

    /// Export the trace to any writer (file, stdout, buffer, etc.)
    ///
    /// # Example
    /// ```
    /// use taskscope::export::ChromeTraceExporter;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let exporter = ChromeTraceExporter::new();
    /// let mut buffer = Vec::new();
    /// exporter.export(&mut buffer)?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Fails if serialization or the underlying writer fails.
    pub fn export<W: Write>(&self, writer: W) -> Result<()> {
        let mut all_events = self.events.clone();

        // One thread_name record per (connection, thread)
        let threads: BTreeSet<(u32, u64)> = self.events.iter().map(|e| (e.pid, e.tid)).collect();
        for (pid, tid) in threads {
            let mut args = HashMap::new();
            args.insert("name".to_string(), serde_json::json!(format!("Thread {tid}")));

            all_events.push(ChromeTraceEvent {
                name: "thread_name".to_string(),
                cat: String::new(),
                ph: "M".to_string(),
                ts: 0.0,
                dur: None,
                pid,
                tid,
                args: Some(args),
            });
        }

        let trace = ChromeTrace { trace_events: all_events, display_time_unit: "ms".to_string() };

        serde_json::to_writer_pretty(writer, &trace).context("Failed to write trace JSON")?;

        Ok(())
    }

    /// Number of task events collected
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CoreId, TaskUid};

    fn report(uid: u32, name: &str, started_at: u32, duration_ms: f64, thread: u64) -> TaskReport {
        TaskReport {
            uid: TaskUid(uid),
            group: None,
            full_name: name.to_string(),
            duration_ms,
            started_at,
            started_on_thread: thread,
            stopped_on_thread: thread,
            started_on_core: CoreId(2),
            stopped_on_core: CoreId::UNKNOWN,
        }
    }

    fn exported(exporter: &ChromeTraceExporter) -> serde_json::Value {
        let mut buffer = Vec::new();
        exporter.export(&mut buffer).unwrap();
        serde_json::from_slice(&buffer).unwrap()
    }

    #[test]
    fn test_complete_events_relative_to_first_start() {
        let mut exporter = ChromeTraceExporter::new();
        exporter.add_report(1, &report(1, "compute", 1_000, 0.25, 7), TickFrequency::MICROS);
        exporter.add_report(1, &report(2, "render", 3_000, 1.5, 7), TickFrequency::MICROS);

        let json = exported(&exporter);
        let events = json["traceEvents"].as_array().unwrap();
        let render = events.iter().find(|e| e["name"] == "render").unwrap();

        assert_eq!(render["ph"], "X");
        assert_eq!(render["ts"], 2000.0);
        assert_eq!(render["dur"], 1500.0);
        assert_eq!(render["args"]["started_on_core"], "CPU:2");
        assert_eq!(exporter.event_count(), 2);
    }

    #[test]
    fn test_thread_metadata_once_per_thread() {
        let mut exporter = ChromeTraceExporter::new();
        exporter.add_report(1, &report(1, "a", 0, 1.0, 7), TickFrequency::MICROS);
        exporter.add_report(1, &report(2, "b", 5, 1.0, 7), TickFrequency::MICROS);
        exporter.add_report(2, &report(1, "a", 0, 1.0, 7), TickFrequency::MICROS);

        let json = exported(&exporter);
        let metadata: Vec<_> =
            json["traceEvents"].as_array().unwrap().iter().filter(|e| e["ph"] == "M").collect();

        assert_eq!(metadata.len(), 2);
        assert!(metadata.iter().all(|e| e.get("dur").is_none()));
    }

    #[test]
    fn test_empty_export_is_valid() {
        let json = exported(&ChromeTraceExporter::new());
        assert_eq!(json["displayTimeUnit"], "ms");
        assert!(json["traceEvents"].as_array().unwrap().is_empty());
    }
}
