//! Duration statistics per task name.
//!
//! Aggregates [`TaskReport`]s by full name so the collector can show which
//! kinds of task consume the most wall time.
//!
//! # Data Flow
//!
//! ```text
//! CollectorEvent::Closed { tasks }
//!     │
//!     └──► DurationStats.record()  ← once per final report
//!              │
//!              └──► summaries()    ← sorted view for printing
//! ```
//!
//! Only final reports should be recorded: live reports for the same task can
//! carry a shorter name that the group resolves later.

// Percentage and mean calculations intentionally convert u64 to f64
#![allow(clippy::cast_precision_loss)]

use std::collections::HashMap;

use crate::server::TaskReport;

// =============================================================================
// TASK SUMMARY (OUTPUT TYPE)
// =============================================================================

/// Aggregated durations of every task sharing one full name.
///
/// ```text
/// TASK                    COUNT    TOTAL ms   MEAN ms    MAX ms   SHARE
/// pipeline/stage2             4      812.40    203.10    390.02   61.2%
/// pipeline                    1      430.11    430.11    430.11   32.4%
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSummary {
    /// Full slash-separated name
    pub name: String,

    pub count: u64,

    pub total_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,

    /// Share of the summed duration of all recorded tasks (0.0 - 100.0).
    ///
    /// Nested tasks overlap their groups, so shares are relative to the sum
    /// of all reports, not to elapsed time.
    pub percentage: f64,

    /// Per-thread breakdown: stopping thread → task count
    pub threads: HashMap<u64, u64>,
}

impl TaskSummary {
    #[must_use]
    pub fn mean_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms / self.count as f64
        }
    }
}

// =============================================================================
// DURATION STATS (AGGREGATOR)
// =============================================================================

/// Streaming aggregator over task reports.
///
/// `record()` is O(1) amortized; `summaries()` sorts the distinct names.
#[derive(Debug, Default)]
pub struct DurationStats {
    tasks: HashMap<String, NameStats>,
    total_ms: f64,
    recorded: u64,
}

#[derive(Debug, Clone)]
struct NameStats {
    count: u64,
    total_ms: f64,
    min_ms: f64,
    max_ms: f64,
    threads: HashMap<u64, u64>,
}

impl DurationStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one report into the statistics
    pub fn record(&mut self, report: &TaskReport) {
        let duration = report.duration_ms;
        self.total_ms += duration;
        self.recorded += 1;

        let stats = self.tasks.entry(report.full_name.clone()).or_insert_with(|| NameStats {
            count: 0,
            total_ms: 0.0,
            min_ms: f64::INFINITY,
            max_ms: 0.0,
            threads: HashMap::new(),
        });

        stats.count += 1;
        stats.total_ms += duration;
        stats.min_ms = stats.min_ms.min(duration);
        stats.max_ms = stats.max_ms.max(duration);
        *stats.threads.entry(report.stopped_on_thread).or_insert(0) += 1;
    }

    /// Record every report of a slice
    pub fn extend<'a>(&mut self, reports: impl IntoIterator<Item = &'a TaskReport>) {
        for report in reports {
            self.record(report);
        }
    }

    /// Number of reports recorded so far
    #[must_use]
    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recorded == 0
    }

    /// One summary per distinct full name, largest total first
    ///
    /// Ties are broken by name so the output is stable.
    #[must_use]
    pub fn summaries(&self) -> Vec<TaskSummary> {
        let mut summaries: Vec<TaskSummary> = self
            .tasks
            .iter()
            .map(|(name, stats)| {
                let percentage = if self.total_ms > 0.0 { stats.total_ms / self.total_ms * 100.0 } else { 0.0 };
                TaskSummary {
                    name: name.clone(),
                    count: stats.count,
                    total_ms: stats.total_ms,
                    min_ms: stats.min_ms,
                    max_ms: stats.max_ms,
                    percentage,
                    threads: stats.threads.clone(),
                }
            })
            .collect();

        summaries.sort_by(|a, b| b.total_ms.total_cmp(&a.total_ms).then_with(|| a.name.cmp(&b.name)));
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CoreId, TaskUid};

    fn report(uid: u32, name: &str, duration_ms: f64, thread: u64) -> TaskReport {
        TaskReport {
            uid: TaskUid(uid),
            group: None,
            full_name: name.to_string(),
            duration_ms,
            started_at: 0,
            started_on_thread: thread,
            stopped_on_thread: thread,
            started_on_core: CoreId::UNKNOWN,
            stopped_on_core: CoreId::UNKNOWN,
        }
    }

    fn sample() -> DurationStats {
        let mut stats = DurationStats::new();
        stats.extend(&[
            report(1, "pipeline/load", 10.0, 7),
            report(2, "pipeline/load", 30.0, 8),
            report(3, "pipeline", 50.0, 7),
            report(4, "render", 10.0, 7),
        ]);
        stats
    }

    #[test]
    fn test_summaries_aggregate_by_name() {
        let summaries = sample().summaries();

        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].name, "pipeline");
        assert_eq!(summaries[1].name, "pipeline/load");
        assert_eq!(summaries[1].count, 2);
        assert!((summaries[1].total_ms - 40.0).abs() < 1e-9);
        assert!((summaries[1].min_ms - 10.0).abs() < 1e-9);
        assert!((summaries[1].max_ms - 30.0).abs() < 1e-9);
        assert!((summaries[1].mean_ms() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_percentages_sum_to_hundred() {
        let summaries = sample().summaries();

        assert!((summaries[0].percentage - 50.0).abs() < 1e-9);
        let sum: f64 = summaries.iter().map(|s| s.percentage).sum();
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_tracks_threads() {
        let summaries = sample().summaries();
        let load = &summaries[1];

        assert_eq!(load.threads.len(), 2);
        assert_eq!(load.threads[&7], 1);
        assert_eq!(load.threads[&8], 1);
    }

    #[test]
    fn test_zero_durations() {
        let mut stats = DurationStats::new();
        assert!(stats.is_empty());
        stats.record(&report(1, "noop", 0.0, 1));

        let summaries = stats.summaries();
        assert_eq!(stats.recorded(), 1);
        assert!(summaries[0].percentage.abs() < f64::EPSILON);
        assert!(summaries[0].min_ms.abs() < f64::EPSILON);
    }
}
