//! Collector side of the pipeline
//!
//! ```text
//! socket ──► FrameReader ──► decode_event ──► Reconstructor ──► CollectorEvent
//!            (per connection)                  (per connection)   (channel)
//! ```
//!
//! - [`frame_reader`]: turns a byte stream into complete frames
//! - [`reconstructor`]: per-connection task state, full names and durations
//! - [`collector`]: accept loop, one thread per connection

pub mod collector;
pub mod frame_reader;
pub mod reconstructor;

pub use collector::{handle_connection, CloseOutcome, CollectorConfig, CollectorEvent, CollectorServer};
pub use frame_reader::{FrameAssembler, FrameReader, DEFAULT_READ_CHUNK};
pub use reconstructor::{Reconstructor, TaskReport};
