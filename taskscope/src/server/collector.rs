//! TCP collector
//!
//! One blocking accept loop; every accepted connection gets its own thread
//! with its own [`FrameReader`] and [`Reconstructor`]. Nothing is shared
//! between connections. Results leave through a channel of
//! [`CollectorEvent`]s.
//!
//! A connection ends on clean EOF, or is torn down on the first malformed
//! frame, read error or EOF inside a frame. Other connections are unaffected.

use crossbeam_channel::Sender;
use log::{debug, info, warn};
use std::io::Read;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::thread;

use taskscope_common::DEFAULT_PORT;

use super::frame_reader::{FrameReader, DEFAULT_READ_CHUNK};
use super::reconstructor::{Reconstructor, TaskReport};
use crate::codec::decode_event;
use crate::domain::{ProtocolError, TickFrequency};

/// Collector settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorConfig {
    pub listen: SocketAddr,
    /// Tick rate of the producers' clocks
    pub frequency: TickFrequency,
    /// Bytes requested per socket read
    pub read_chunk: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            frequency: TickFrequency::default(),
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }
}

/// How a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Peer closed between frames
    Clean,
    /// Connection torn down; the reason is the error that caused it
    Aborted(String),
}

/// Output of the collector
#[derive(Debug, Clone)]
pub enum CollectorEvent {
    Connected { peer: SocketAddr },
    /// One fully decoded frame
    Report { peer: SocketAddr, report: TaskReport },
    /// An earlier task whose full name a later frame completed
    Resolved { peer: SocketAddr, report: TaskReport },
    /// Connection ended; `tasks` holds every task of the connection resolved
    /// against the final hierarchy
    Closed { peer: SocketAddr, outcome: CloseOutcome, tasks: Vec<TaskReport> },
}

/// Listening collector
#[derive(Debug)]
pub struct CollectorServer {
    listener: TcpListener,
    config: CollectorConfig,
}

impl CollectorServer {
    /// Bind the listening socket
    ///
    /// # Errors
    /// Returns [`ProtocolError::Io`] if the address cannot be bound.
    pub fn bind(config: CollectorConfig) -> Result<Self, ProtocolError> {
        let listener = TcpListener::bind(config.listen)?;
        info!("Collector listening on {}", listener.local_addr()?);
        Ok(Self { listener, config })
    }

    /// Address actually bound (resolves port 0)
    ///
    /// # Errors
    /// Returns the socket error, if any.
    pub fn local_addr(&self) -> Result<SocketAddr, ProtocolError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the process exits
    ///
    /// Accept failures are logged and skipped.
    pub fn run(self, sink: &Sender<CollectorEvent>) {
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => self.spawn_connection(stream, sink.clone()),
                Err(e) => warn!("Accept failed: {e}"),
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, sink: Sender<CollectorEvent>) {
        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(e) => {
                warn!("Dropping connection without peer address: {e}");
                return;
            }
        };
        let config = self.config;

        let spawned = thread::Builder::new()
            .name(format!("taskscope-{peer}"))
            .spawn(move || handle_connection(stream, peer, &config, &sink));
        if let Err(e) = spawned {
            warn!("Failed to spawn handler for {peer}: {e}");
        }
    }
}

/// Run one connection to completion
///
/// Emits `Connected`, one `Report` per decoded frame, a `Resolved` for each
/// earlier task a frame completed the name of, and a final `Closed`.
/// If the receiving end of `sink` is gone the connection is abandoned.
pub fn handle_connection<R: Read>(
    source: R,
    peer: SocketAddr,
    config: &CollectorConfig,
    sink: &Sender<CollectorEvent>,
) -> CloseOutcome {
    info!("Accepted connection from {peer}");
    let _ = sink.send(CollectorEvent::Connected { peer });

    let mut reader = FrameReader::with_chunk_size(source, config.read_chunk);
    let mut state = Reconstructor::new(config.frequency);

    let outcome = loop {
        let frame = match reader.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break CloseOutcome::Clean,
            Err(e) => break CloseOutcome::Aborted(e.to_string()),
        };

        let (event, name) = match decode_event(frame.as_bytes()) {
            Ok(decoded) => decoded,
            Err(e) => break CloseOutcome::Aborted(ProtocolError::from(e).to_string()),
        };

        let (report, resolved) = state.apply_resolving(event, name);
        debug!("{peer}: {} took {:.3}ms", report.full_name, report.duration_ms);

        let delivered = std::iter::once(CollectorEvent::Report { peer, report })
            .chain(resolved.into_iter().map(|report| CollectorEvent::Resolved { peer, report }))
            .all(|event| sink.send(event).is_ok());
        if !delivered {
            break CloseOutcome::Aborted("report channel closed".to_string());
        }
    };

    match &outcome {
        CloseOutcome::Clean => info!("{peer} closed after {} tasks", state.len()),
        CloseOutcome::Aborted(reason) => warn!("{peer} torn down after {} tasks: {reason}", state.len()),
    }

    let _ = sink.send(CollectorEvent::Closed { peer, outcome: outcome.clone(), tasks: state.finish() });
    outcome
}
