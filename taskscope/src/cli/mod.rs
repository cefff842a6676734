//! Command-line parsing for the collector and the demo emitter

pub mod args;

pub use args::{CollectorArgs, EmitArgs};
