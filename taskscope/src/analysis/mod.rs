//! Analysis over reconstructed task reports
//!
//! Pure aggregation, separate from the collector and from printing.

pub mod duration_stats;

pub use duration_stats::{DurationStats, TaskSummary};
