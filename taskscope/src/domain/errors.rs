//! Structured error types for taskscope
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::types::TaskUid;
use thiserror::Error;

/// Failures while encoding or decoding a wire frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Frame truncated: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("Length prefix says {declared} bytes but frame has {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Schema version {found} does not match expected {expected}")]
    SchemaMismatch { expected: u16, found: u16 },

    #[error("Task name is not valid UTF-8")]
    InvalidUtf8,

    #[error("{0} unread bytes after the last field")]
    TrailingBytes(usize),
}

/// Failures surfaced by the event client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to connect to collector at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to send frame: {0}")]
    Send(#[from] std::io::Error),

    #[error(transparent)]
    Encode(#[from] CodecError),

    #[error("{0} was never registered")]
    UnknownTask(TaskUid),
}

/// Failures on a collector connection
///
/// Any of these tears down the affected connection only.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Frame declares {0} bytes, fewer than its own header")]
    MalformedLength(usize),

    #[error("Connection closed with {pending} bytes of an incomplete frame")]
    UnexpectedEof { pending: usize },

    #[error(transparent)]
    Codec(#[from] CodecError),
}
