//! # Event Client
//!
//! Producer side of the pipeline: mirrors engine task instances, fills in
//! their [`TaskEvent`] from lifecycle hooks and streams one frame per task to
//! the collector.
//!
//! ## Layers
//!
//! - [`EventClient`]: owns the transport; serializes sends from any thread
//! - [`TaskProbe`]: per-task record owned by the wrapper of one engine task
//! - [`TaskLifecycle`] / [`TelemetryListener`]: uid-keyed hook interface for
//!   engines that only report task identifiers
//!
//! Delivery is best-effort: a failed send is reported to the caller and the
//! event is dropped. There is no retry and no reconnect.

pub mod listener;
pub mod probe;

pub use listener::{TaskLifecycle, TelemetryListener};
pub use probe::{ExecutionStamp, TaskProbe};

use log::{info, warn};
use std::io::Write;
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use taskscope_common::{TaskEvent, DEFAULT_PORT};

use crate::codec::{encode_event, Frame};
use crate::domain::ClientError;

/// Where the client connects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Collector `host:port`
    pub addr: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { addr: format!("localhost:{DEFAULT_PORT}") }
    }
}

/// Frame sender sharing one transport between all task threads
///
/// Sends are serialized by a mutex: a socket is not safely writable from
/// several threads at once, and frames must not interleave.
#[derive(Debug)]
pub struct EventClient<W = TcpStream> {
    transport: Mutex<W>,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

impl EventClient<TcpStream> {
    /// Open the TCP connection to the collector
    ///
    /// # Errors
    /// Returns [`ClientError::Connect`] if the address cannot be reached.
    pub fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let connect_err = |source| ClientError::Connect { addr: config.addr.clone(), source };

        let stream = TcpStream::connect(&config.addr).map_err(connect_err)?;
        // Frames are small and latency matters more than packet count
        stream.set_nodelay(true).map_err(connect_err)?;

        info!("Connected to collector at {}", config.addr);
        Ok(Self::new(stream))
    }
}

impl<W: Write> EventClient<W> {
    /// Use an already-open transport
    pub fn new(transport: W) -> Self {
        Self { transport: Mutex::new(transport), frames_sent: AtomicU64::new(0), bytes_sent: AtomicU64::new(0) }
    }

    /// Encode and send one task record
    ///
    /// # Errors
    /// Returns [`ClientError::Encode`] if the name does not fit a frame, or
    /// [`ClientError::Send`] if the transport fails.
    pub fn send_task(&self, event: &TaskEvent, name: &str) -> Result<(), ClientError> {
        let frame = encode_event(event, name)?;
        self.send_frame(&frame)
    }

    /// Write one frame, blocking until the transport accepted all of it
    ///
    /// # Errors
    /// Returns [`ClientError::Send`] on any transport error.
    pub fn send_frame(&self, frame: &Frame) -> Result<(), ClientError> {
        let mut transport = self.transport.lock().unwrap_or_else(PoisonError::into_inner);

        if let Err(e) = transport.write_all(frame.as_bytes()).and_then(|()| transport.flush()) {
            warn!("Dropping {} byte frame: {e}", frame.len());
            return Err(ClientError::Send(e));
        }

        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(frame.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Frames handed to the transport so far
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Bytes handed to the transport so far
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn into_inner(self) -> W {
        self.transport.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
