//! Simulated task engine streaming to a collector
//!
//! Runs one "pipeline" group whose child stages execute on a pool of worker
//! threads, reporting every lifecycle hook through [`TelemetryListener`].
//! The group is destroyed last, so the collector sees it after its children.
//!
//! Run with: `taskscope-emit --connect localhost:9000 --tasks 16 --workers 4`

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::unbounded;
use log::info;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use taskscope::cli::EmitArgs;
use taskscope::client::{EventClient, TaskLifecycle, TelemetryListener};
use taskscope::clock::MonotonicClock;
use taskscope::domain::TaskUid;
use taskscope_common::INVALID_UID;

const PIPELINE_UID: TaskUid = TaskUid(1);

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = EmitArgs::parse();
    anyhow::ensure!(args.workers > 0, "--workers must be at least 1");

    let client = Arc::new(EventClient::connect(&args.config())?);
    let listener = TelemetryListener::new(Arc::clone(&client), MonotonicClock::new());

    listener.on_created(PIPELINE_UID, "pipeline");
    listener.on_pre_execute(PIPELINE_UID);

    let (work_tx, work_rx) = unbounded();
    for stage in 1..=args.tasks {
        let uid = PIPELINE_UID
            .0
            .checked_add(stage)
            .filter(|uid| *uid != INVALID_UID)
            .map(TaskUid)
            .with_context(|| format!("No task uid left for stage {stage}"))?;
        listener.on_created(uid, &format!("stage{stage}"));
        listener.on_added_to_group(uid, PIPELINE_UID);
        work_tx.send((uid, stage)).context("Work queue closed")?;
    }
    drop(work_tx);

    thread::scope(|scope| -> Result<()> {
        let workers: Vec<_> = (0..args.workers)
            .map(|worker| {
                let work_rx = work_rx.clone();
                let listener = &listener;
                thread::Builder::new().name(format!("emit-worker-{worker}")).spawn_scoped(scope, move || {
                    for (uid, stage) in work_rx {
                        listener.on_pre_execute(uid);
                        busy_work(Duration::from_millis(u64::from(stage % 5 + 1) * 2));
                        listener.on_post_execute(uid);
                        listener.on_destroyed(uid)?;
                    }
                    Ok::<_, anyhow::Error>(())
                })
            })
            .collect::<std::io::Result<_>>()
            .context("Failed to spawn worker")?;

        for worker in workers {
            worker.join().map_err(|_| anyhow::anyhow!("Worker panicked"))??;
        }
        Ok(())
    })?;

    listener.on_post_execute(PIPELINE_UID);
    listener.on_destroyed(PIPELINE_UID)?;

    info!("{} tasks still in flight", listener.in_flight());
    println!("sent: {} frames, {} bytes", client.frames_sent(), client.bytes_sent());
    Ok(())
}

/// Burn CPU for roughly `duration`
fn busy_work(duration: Duration) {
    let start = Instant::now();
    let mut result = 0u64;
    while start.elapsed() < duration {
        for _ in 0..10_000 {
            result = result.wrapping_add(std::hint::black_box(1));
        }
    }
    std::hint::black_box(result);
}
