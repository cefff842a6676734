//! Trace export
//!
//! Writes reconstructed tasks in Chrome Trace Event Format for Perfetto or
//! chrome://tracing.

pub mod chrome_trace;

pub use chrome_trace::ChromeTraceExporter;
