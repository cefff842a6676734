//! CLI argument definitions

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::client::ClientConfig;
use crate::domain::TickFrequency;
use crate::server::{CollectorConfig, DEFAULT_READ_CHUNK};

#[derive(Parser, Debug)]
#[command(
    name = "taskscope",
    about = "Collect task execution telemetry and report durations",
    after_help = "\
EXAMPLES:
    taskscope                                Listen on 0.0.0.0:9000
    taskscope --listen 127.0.0.1:7000        Custom address
    taskscope --duration 30 --export t.json  Stop after 30s and write a trace"
)]
pub struct CollectorArgs {
    /// Address to accept producers on
    #[arg(short, long, default_value = "0.0.0.0:9000")]
    pub listen: SocketAddr,

    /// Tick rate of the producers' clock, in Hz
    #[arg(short, long, default_value_t = TickFrequency::MICROS.0)]
    pub frequency: u64,

    /// Export collected tasks as a Chrome trace
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Stop after N seconds (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Suppress per-task output
    #[arg(short, long)]
    pub quiet: bool,
}

impl CollectorArgs {
    #[must_use]
    pub fn config(&self) -> CollectorConfig {
        CollectorConfig {
            listen: self.listen,
            frequency: TickFrequency(self.frequency),
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }
}

/// Upper bound for `--tasks`; child uids follow the pipeline's uid
pub const MAX_EMIT_TASKS: u32 = 100_000;

#[derive(Parser, Debug)]
#[command(name = "taskscope-emit", about = "Run a simulated task pipeline and stream its telemetry")]
pub struct EmitArgs {
    /// Collector to stream to
    #[arg(short, long, default_value = "localhost:9000")]
    pub connect: String,

    /// Child tasks in the pipeline group
    #[arg(short, long, default_value = "8", value_parser = clap::value_parser!(u32).range(0..=i64::from(MAX_EMIT_TASKS)))]
    pub tasks: u32,

    /// Worker threads executing the children
    #[arg(short, long, default_value = "4")]
    pub workers: usize,
}

impl EmitArgs {
    #[must_use]
    pub fn config(&self) -> ClientConfig {
        ClientConfig { addr: self.connect.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_defaults() {
        let args = CollectorArgs::parse_from(["taskscope"]);
        let config = args.config();

        assert_eq!(config, CollectorConfig::default());
        assert!(args.export.is_none());
        assert_eq!(args.duration, 0);
    }

    #[test]
    fn test_collector_overrides() {
        let args = CollectorArgs::parse_from([
            "taskscope",
            "--listen",
            "127.0.0.1:7000",
            "--frequency",
            "1000",
            "--export",
            "trace.json",
            "-q",
        ]);

        assert_eq!(args.config().listen.port(), 7000);
        assert_eq!(args.config().frequency, TickFrequency(1000));
        assert_eq!(args.export.as_deref(), Some(std::path::Path::new("trace.json")));
        assert!(args.quiet);
    }

    #[test]
    fn test_emit_defaults() {
        let args = EmitArgs::parse_from(["taskscope-emit"]);
        assert_eq!(args.config(), ClientConfig::default());
        assert_eq!(args.tasks, 8);
        assert_eq!(args.workers, 4);
    }

    #[test]
    fn test_emit_task_count_is_bounded() {
        let args = EmitArgs::parse_from(["taskscope-emit", "--tasks", "100000"]);
        assert_eq!(args.tasks, MAX_EMIT_TASKS);

        assert!(EmitArgs::try_parse_from(["taskscope-emit", "--tasks", "100001"]).is_err());
        assert!(EmitArgs::try_parse_from(["taskscope-emit", "--tasks", "4294967295"]).is_err());
    }

    #[test]
    fn test_rejects_bad_listen_address() {
        assert!(CollectorArgs::try_parse_from(["taskscope", "--listen", "nowhere"]).is_err());
    }
}
