//! Frame assembly from a byte stream
//!
//! TCP delivers bytes, not frames. [`FrameAssembler`] accumulates whatever
//! arrives and splits off complete frames using each frame's self-declared
//! length; [`FrameReader`] drives it from any [`Read`] source.

use std::io::{ErrorKind, Read};

use taskscope_common::FRAME_HEADER_LEN;

use crate::codec::{declared_len, Frame};
use crate::domain::ProtocolError;

/// Bytes requested from the socket per read call
pub const DEFAULT_READ_CHUNK: usize = 1024;

/// Sans-IO frame accumulator
#[derive(Debug, Default)]
pub struct FrameAssembler {
    partial: Vec<u8>,
}

impl FrameAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the stream
    pub fn push(&mut self, bytes: &[u8]) {
        self.partial.extend_from_slice(bytes);
    }

    /// Split off the next complete frame, if one is buffered
    ///
    /// Bytes after the frame stay buffered as the start of the next one.
    ///
    /// # Errors
    /// Returns [`ProtocolError::MalformedLength`] if a frame declares a length
    /// shorter than its own header. The stream cannot be resynchronized after
    /// that.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        let Some(expected) = self.expected_len() else {
            return Ok(None);
        };
        if expected < FRAME_HEADER_LEN {
            return Err(ProtocolError::MalformedLength(expected));
        }
        if self.partial.len() < expected {
            return Ok(None);
        }

        let rest = self.partial.split_off(expected);
        let bytes = std::mem::replace(&mut self.partial, rest);
        Ok(Some(Frame::from_bytes(bytes)?))
    }

    /// Length declared by the frame being assembled, once its header arrived
    #[must_use]
    pub fn expected_len(&self) -> Option<usize> {
        declared_len(&self.partial).ok()
    }

    /// Buffered bytes not yet returned as a frame
    #[must_use]
    pub fn pending(&self) -> usize {
        self.partial.len()
    }
}

/// Blocking frame reader over a byte stream
#[derive(Debug)]
pub struct FrameReader<R> {
    source: R,
    assembler: FrameAssembler,
    chunk: Vec<u8>,
}

impl<R: Read> FrameReader<R> {
    pub fn new(source: R) -> Self {
        Self::with_chunk_size(source, DEFAULT_READ_CHUNK)
    }

    /// # Panics
    /// Panics if `chunk_size` is zero.
    pub fn with_chunk_size(source: R, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "Read chunk size must be non-zero");
        Self { source, assembler: FrameAssembler::new(), chunk: vec![0; chunk_size] }
    }

    /// Block until the next complete frame
    ///
    /// Returns `Ok(None)` when the peer closed the stream between frames.
    ///
    /// # Errors
    /// Returns [`ProtocolError::UnexpectedEof`] if the stream ends inside a
    /// frame, [`ProtocolError::Io`] on read errors, and the assembler's
    /// errors for malformed lengths.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        loop {
            if let Some(frame) = self.assembler.next_frame()? {
                return Ok(Some(frame));
            }

            let read = match self.source.read(&mut self.chunk) {
                Ok(read) => read,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if read == 0 {
                let pending = self.assembler.pending();
                return if pending == 0 { Ok(None) } else { Err(ProtocolError::UnexpectedEof { pending }) };
            }
            self.assembler.push(&self.chunk[..read]);
        }
    }

    /// Buffered bytes of an incomplete frame
    #[must_use]
    pub fn pending(&self) -> usize {
        self.assembler.pending()
    }

    pub fn into_inner(self) -> R {
        self.source
    }
}
