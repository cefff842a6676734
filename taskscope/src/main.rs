//! # taskscope - Collector Entry Point
//!
//! Accepts producer connections, prints one line per reconstructed task and
//! a per-name summary at shutdown. Optionally writes a Chrome trace.
//!
//! Stops on Ctrl+C or after `--duration` seconds.

// Summary table converts counts for display
#![allow(clippy::cast_precision_loss)]

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, TryRecvError};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use taskscope::analysis::DurationStats;
use taskscope::cli::CollectorArgs;
use taskscope::domain::TaskUid;
use taskscope::export::ChromeTraceExporter;
use taskscope::server::{CloseOutcome, CollectorEvent, CollectorServer, TaskReport};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NOPERM: i32 = 77;

/// Reports buffered between the connection threads and the main loop
const EVENT_QUEUE_DEPTH: usize = 1000;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied") {
        EXIT_NOPERM
    } else {
        EXIT_ERROR
    }
}

/// Main-loop view of every connection seen so far
#[derive(Default)]
struct Sessions {
    /// Stable small ids for the trace export, in connect order
    ids: HashMap<SocketAddr, u32>,
    /// Latest report per task of connections still open
    live: HashMap<SocketAddr, HashMap<TaskUid, TaskReport>>,
    reports: u64,
    clean: u64,
    aborted: u64,
}

impl Sessions {
    fn id_of(&mut self, peer: SocketAddr) -> u32 {
        let next = u32::try_from(self.ids.len() + 1).unwrap_or(u32::MAX);
        *self.ids.entry(peer).or_insert(next)
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = CollectorArgs::parse();
    let quiet = args.quiet;
    let config = args.config();

    let server =
        CollectorServer::bind(config).with_context(|| format!("Failed to listen on {}", config.listen))?;
    let local_addr = server.local_addr()?;

    if !quiet {
        println!("taskscope v{}", env!("CARGO_PKG_VERSION"));
        println!("listening: {local_addr}");
        println!("tick rate: {}", config.frequency);
        if let Some(ref export_path) = args.export {
            println!("export: {}", export_path.display());
        }
    }

    // Connection threads feed the main loop through a bounded channel
    let (event_tx, event_rx) = bounded(EVENT_QUEUE_DEPTH);
    std::thread::Builder::new()
        .name("taskscope-accept".to_string())
        .spawn(move || server.run(&event_tx))
        .context("Failed to spawn accept thread")?;

    let mut sessions = Sessions::default();
    let mut stats = DurationStats::new();
    let mut exporter = args.export.as_ref().map(|_| ChromeTraceExporter::new());

    // Setup Ctrl+C handler
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let started = Instant::now();
    let duration_limit = if args.duration > 0 { Some(Duration::from_secs(args.duration)) } else { None };
    let mut last_status_time = Instant::now();
    let mut exit_reason = "interrupted";

    loop {
        if let Some(limit) = duration_limit {
            if started.elapsed() >= limit {
                exit_reason = "duration limit reached";
                break;
            }
        }

        if sessions.ids.is_empty() && last_status_time.elapsed() > Duration::from_secs(10) {
            info!("Still waiting for producers on {local_addr}...");
            last_status_time = Instant::now();
        }

        // Process all available events
        loop {
            let event = match event_rx.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => anyhow::bail!("Accept loop stopped unexpectedly"),
            };

            match event {
                CollectorEvent::Connected { peer } => {
                    let id = sessions.id_of(peer);
                    sessions.live.insert(peer, HashMap::new());
                    if !quiet {
                        println!("[{id}] connected: {peer}");
                    }
                }
                CollectorEvent::Report { peer, report } => {
                    sessions.reports += 1;
                    let id = sessions.id_of(peer);
                    if quiet {
                        debug!("[{id}] {} {:.3}ms", report.full_name, report.duration_ms);
                    } else {
                        println!(
                            "[{id}] {:<32} {:>10.3}ms  start {} stop {}",
                            report.full_name, report.duration_ms, report.started_on_core, report.stopped_on_core
                        );
                    }
                    sessions.live.entry(peer).or_default().insert(report.uid, report);
                }
                CollectorEvent::Resolved { peer, report } => {
                    let id = sessions.id_of(peer);
                    if quiet {
                        debug!("[{id}] resolved {}", report.full_name);
                    } else {
                        println!("[{id}] resolved: {}", report.full_name);
                    }
                    sessions.live.entry(peer).or_default().insert(report.uid, report);
                }
                CollectorEvent::Closed { peer, outcome, tasks } => {
                    let id = sessions.id_of(peer);
                    sessions.live.remove(&peer);
                    match outcome {
                        CloseOutcome::Clean => sessions.clean += 1,
                        CloseOutcome::Aborted(ref reason) => {
                            sessions.aborted += 1;
                            warn!("[{id}] {peer} aborted: {reason}");
                        }
                    }
                    if !quiet {
                        println!("[{id}] closed: {peer}, {} tasks", tasks.len());
                    }

                    stats.extend(&tasks);
                    if let Some(ref mut exporter) = exporter {
                        exporter.add_reports(id, &tasks, config.frequency);
                    }
                }
            }
        }

        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(100)) => {}
            _ = &mut ctrl_c => {
                break;
            }
        }
    }

    // Connections still open contribute their latest reports, names included
    for (peer, reports) in std::mem::take(&mut sessions.live) {
        let id = sessions.id_of(peer);
        let mut reports: Vec<_> = reports.into_values().collect();
        reports.sort_by_key(|r| (r.started_at, r.uid));
        stats.extend(&reports);
        if let Some(ref mut exporter) = exporter {
            exporter.add_reports(id, &reports, config.frequency);
        }
    }

    eprintln!(
        "\n{}: {:.1}s, {} connections ({} clean, {} aborted), {} reports",
        exit_reason,
        started.elapsed().as_secs_f64(),
        sessions.ids.len(),
        sessions.clean,
        sessions.aborted,
        sessions.reports,
    );
    print_summary(&stats);

    if let (Some(exporter), Some(export_path)) = (exporter, args.export.as_ref()) {
        let file = File::create(export_path).context("Failed to create trace output file")?;
        let writer = BufWriter::new(file);
        exporter.export(writer).context("Failed to export trace")?;

        if !quiet {
            println!("saved: {} ({} tasks)", export_path.display(), exporter.event_count());
        }
    }

    Ok(())
}

fn print_summary(stats: &DurationStats) {
    if stats.is_empty() {
        return;
    }

    eprintln!("\n{:<32} {:>7} {:>12} {:>10} {:>10} {:>10} {:>7}", "TASK", "COUNT", "TOTAL ms", "MEAN ms", "MIN ms", "MAX ms", "SHARE");
    for summary in stats.summaries() {
        eprintln!(
            "{:<32} {:>7} {:>12.3} {:>10.3} {:>10.3} {:>10.3} {:>6.1}%",
            summary.name,
            summary.count,
            summary.total_ms,
            summary.mean_ms(),
            summary.min_ms,
            summary.max_ms,
            summary.percentage,
        );
    }
}
