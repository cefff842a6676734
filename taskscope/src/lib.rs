//! # taskscope - Task Execution Telemetry
//!
//! taskscope streams start/stop/group records of units of work ("tasks")
//! executed by a task-scheduling engine to a collector, which reconstructs
//! each task's place in its group hierarchy and reports how long it ran and
//! where (thread, core).
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Task Engine (producer)                       │
//! │   created ─► added to group ─► pre-execute ─► post-execute      │
//! │                                                   ─► destroyed  │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ lifecycle hooks
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  client: TaskProbe / TelemetryListener ──► EventClient          │
//! │          (one TaskEvent per task)         (mutex-serialized)    │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ TCP, one length-prefixed frame per task
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  server (one thread per connection)                             │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐        │
//! │  │ FrameReader  │──▶│ decode_event │──▶│Reconstructor │──▶ channel
//! │  └──────────────┘   └──────────────┘   └──────────────┘        │
//! └─────────────────────────────────────────────────────────────────┘
//!                         │
//!                         ▼
//!           analysis (duration stats)   export (trace.json)
//! ```
//!
//! ## Module Structure
//!
//! ### Wire Layer
//!
//! - [`ring_buffer`]: fixed-capacity single-producer single-consumer byte
//!   queue, split into a producer and a consumer half
//! - [`buffer`]: typed reads and writes of plain-old-data values over any
//!   byte sink or source
//! - [`codec`]: positional frame encoding, `u16` length prefix, schema id
//!
//! ### Pipeline
//!
//! - [`clock`]: tick clock, current core and OS thread id
//! - [`client`]: producer-side probes, lifecycle listener and sender
//! - [`server`]: frame reassembly, hierarchy reconstruction, TCP collector
//!
//! ### Reporting
//!
//! - [`analysis`]: per-name duration statistics
//! - [`export`]: Chrome Trace Event Format JSON for Perfetto or
//!   `chrome://tracing`
//!
//! ### Support
//!
//! - [`cli`]: command-line arguments for both binaries
//! - [`domain`]: newtypes ([`domain::TaskUid`], [`domain::CoreId`],
//!   [`domain::TickFrequency`]) and error types
//!
//! ## Typical Usage
//!
//! ```bash
//! # Collector
//! RUST_LOG=info taskscope --listen 0.0.0.0:9000 --export trace.json
//!
//! # Simulated producer
//! taskscope-emit --connect localhost:9000 --tasks 16 --workers 4
//! ```
//!
//! ## Delivery Model
//!
//! Best-effort. Sends are not acknowledged or retried; a dropped connection
//! loses in-flight tasks. Every connection is reconstructed independently.

// Expose modules for testing
pub mod analysis;
pub mod buffer;
pub mod cli;
pub mod client;
pub mod clock;
pub mod codec;
pub mod domain;
pub mod export;
pub mod ring_buffer;
pub mod server;
