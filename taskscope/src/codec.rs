//! # Wire Codec
//!
//! Positional, length-prefixed binary encoding of an ordered argument list.
//!
//! ## Encoding Rules
//!
//! - Fixed-size values (integers, [`TaskEvent`]) are copied verbatim, in
//!   native byte order, with no padding between fields
//! - Text is a `u64` byte length followed by the raw UTF-8 bytes
//! - Tuples encode their elements left to right
//!
//! A frame reserves two bytes for its total length, encodes the arguments
//! behind them, then back-patches the length:
//!
//! ```text
//! +------------+------------+------------+-----+
//! | u16 length | argument 0 | argument 1 | ... |
//! +------------+------------+------------+-----+
//! ```
//!
//! The protocol is not self-describing: a decoder must ask for the same types
//! in the same order the encoder wrote them. Event frames lead with
//! [`SCHEMA_VERSION`] so that mismatched builds are rejected instead of
//! silently misread.

use std::mem::size_of;

use bytemuck::Pod;
use taskscope_common::{TaskEvent, FRAME_HEADER_LEN, MAX_FRAME_LEN, SCHEMA_VERSION};

use crate::buffer::{ByteCursor, ByteSink, TypedBuffer};
use crate::domain::CodecError;

/// A value that can be appended to a frame
pub trait WireEncode {
    /// Append the encoding of `self`; `false` if the sink ran out of space
    fn encode<S: ByteSink>(&self, out: &mut TypedBuffer<S>) -> bool;

    /// Number of bytes [`WireEncode::encode`] writes
    fn encoded_len(&self) -> usize;
}

/// A value that can be read back from a frame
pub trait WireDecode: Sized {
    /// # Errors
    /// Returns an error if the input is too short or holds invalid data.
    fn decode(input: &mut TypedBuffer<ByteCursor<'_>>) -> Result<Self, CodecError>;
}

fn read_pod<T: Pod>(input: &mut TypedBuffer<ByteCursor<'_>>) -> Result<T, CodecError> {
    let offset = input.get_ref().position();
    input.read_value::<T>().ok_or(CodecError::Truncated { offset, needed: size_of::<T>() })
}

macro_rules! impl_wire_pod {
    ($($ty:ty),* $(,)?) => {
        $(
            impl WireEncode for $ty {
                fn encode<S: ByteSink>(&self, out: &mut TypedBuffer<S>) -> bool {
                    out.write(self)
                }

                fn encoded_len(&self) -> usize {
                    size_of::<$ty>()
                }
            }

            impl WireDecode for $ty {
                fn decode(input: &mut TypedBuffer<ByteCursor<'_>>) -> Result<Self, CodecError> {
                    read_pod(input)
                }
            }
        )*
    };
}

impl_wire_pod!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64, TaskEvent);

impl WireEncode for str {
    fn encode<S: ByteSink>(&self, out: &mut TypedBuffer<S>) -> bool {
        let len = self.len() as u64;
        out.empty_space() >= self.encoded_len()
            && out.write(&len)
            && out.write_slice(self.as_bytes())
    }

    fn encoded_len(&self) -> usize {
        size_of::<u64>() + self.len()
    }
}

impl WireEncode for String {
    fn encode<S: ByteSink>(&self, out: &mut TypedBuffer<S>) -> bool {
        self.as_str().encode(out)
    }

    fn encoded_len(&self) -> usize {
        self.as_str().encoded_len()
    }
}

impl<T: WireEncode + ?Sized> WireEncode for &T {
    fn encode<S: ByteSink>(&self, out: &mut TypedBuffer<S>) -> bool {
        (**self).encode(out)
    }

    fn encoded_len(&self) -> usize {
        (**self).encoded_len()
    }
}

impl WireDecode for String {
    fn decode(input: &mut TypedBuffer<ByteCursor<'_>>) -> Result<Self, CodecError> {
        let len: u64 = read_pod(input)?;
        let offset = input.get_ref().position();
        let len = usize::try_from(len)
            .ok()
            .filter(|len| *len <= input.used_space())
            .ok_or(CodecError::Truncated { offset, needed: usize::try_from(len).unwrap_or(usize::MAX) })?;

        let mut bytes = vec![0u8; len];
        if !input.read_slice(&mut bytes) {
            return Err(CodecError::Truncated { offset, needed: len });
        }
        String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
    }
}

macro_rules! impl_wire_tuple {
    ($($name:ident $var:ident),+) => {
        impl<$($name: WireEncode),+> WireEncode for ($($name,)+) {
            fn encode<S: ByteSink>(&self, out: &mut TypedBuffer<S>) -> bool {
                // All fields or nothing: a bounded sink must not keep a prefix
                if out.empty_space() < self.encoded_len() {
                    return false;
                }
                let ($($var,)+) = self;
                $(
                    if !$var.encode(out) {
                        return false;
                    }
                )+
                true
            }

            fn encoded_len(&self) -> usize {
                let ($($var,)+) = self;
                0 $(+ $var.encoded_len())+
            }
        }

        impl<$($name: WireDecode),+> WireDecode for ($($name,)+) {
            fn decode(input: &mut TypedBuffer<ByteCursor<'_>>) -> Result<Self, CodecError> {
                Ok(($($name::decode(input)?,)+))
            }
        }
    };
}

impl_wire_tuple!(A a);
impl_wire_tuple!(A a, B b);
impl_wire_tuple!(A a, B b, C c);
impl_wire_tuple!(A a, B b, C c, D d);
impl_wire_tuple!(A a, B b, C c, D d, E e);
impl_wire_tuple!(A a, B b, C c, D d, E e, F f);

/// One complete, length-prefixed wire frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Wrap bytes received from the wire, checking the length prefix
    ///
    /// # Errors
    /// Returns [`CodecError::LengthMismatch`] if the prefix disagrees with
    /// the byte count, or [`CodecError::Truncated`] if there is no prefix.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CodecError> {
        let declared = declared_len(&bytes)?;
        if declared != bytes.len() {
            return Err(CodecError::LengthMismatch { declared, actual: bytes.len() });
        }
        Ok(Self { bytes })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The argument bytes behind the length prefix
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.bytes[FRAME_HEADER_LEN..]
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Read the self-declared total length at the start of `bytes`
///
/// # Errors
/// Returns [`CodecError::Truncated`] if fewer than two bytes are given.
pub fn declared_len(bytes: &[u8]) -> Result<usize, CodecError> {
    let prefix = bytes
        .get(..FRAME_HEADER_LEN)
        .ok_or(CodecError::Truncated { offset: 0, needed: FRAME_HEADER_LEN })?;
    Ok(usize::from(u16::from_ne_bytes([prefix[0], prefix[1]])))
}

/// Encode `args` into a single frame
///
/// # Errors
/// Returns [`CodecError::FrameTooLarge`] if the frame would not fit the
/// 16-bit length prefix.
pub fn encode_frame<T: WireEncode + ?Sized>(args: &T) -> Result<Frame, CodecError> {
    let size = FRAME_HEADER_LEN + args.encoded_len();
    if size > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge { size, max: MAX_FRAME_LEN });
    }

    let mut out = TypedBuffer::new(Vec::with_capacity(size));
    let written = out.write(&0u16) && args.encode(&mut out);
    debug_assert!(written, "Vec sink rejected a bounded frame");

    let mut bytes = out.into_inner();
    let total = u16::try_from(bytes.len())
        .map_err(|_| CodecError::FrameTooLarge { size: bytes.len(), max: MAX_FRAME_LEN })?;
    bytes[..FRAME_HEADER_LEN].copy_from_slice(&total.to_ne_bytes());

    Ok(Frame { bytes })
}

/// Decode a `T` starting at `offset`, returning it with the offset after it
///
/// # Errors
/// Returns an error if `buf` ends before `T` is complete or holds invalid text.
pub fn decode_at<T: WireDecode>(buf: &[u8], offset: usize) -> Result<(T, usize), CodecError> {
    if offset > buf.len() {
        return Err(CodecError::Truncated { offset, needed: 0 });
    }
    let mut input = TypedBuffer::new(ByteCursor::at(buf, offset));
    let value = T::decode(&mut input)?;
    Ok((value, input.get_ref().position()))
}

/// Decode a whole frame as a `T`
///
/// # Errors
/// Returns an error if the length prefix disagrees with `frame.len()`, the
/// fields do not decode, or bytes remain after `T`.
pub fn decode_frame<T: WireDecode>(frame: &[u8]) -> Result<T, CodecError> {
    let declared = declared_len(frame)?;
    if declared != frame.len() {
        return Err(CodecError::LengthMismatch { declared, actual: frame.len() });
    }
    let (value, end) = decode_at(frame, FRAME_HEADER_LEN)?;
    if end != frame.len() {
        return Err(CodecError::TrailingBytes(frame.len() - end));
    }
    Ok(value)
}

/// Encode one task event and its name, tagged with [`SCHEMA_VERSION`]
///
/// # Errors
/// Returns [`CodecError::FrameTooLarge`] for names that do not fit a frame.
pub fn encode_event(event: &TaskEvent, name: &str) -> Result<Frame, CodecError> {
    encode_frame(&(SCHEMA_VERSION, *event, name))
}

/// Decode a frame produced by [`encode_event`]
///
/// The schema version is checked before any other field is interpreted.
///
/// # Errors
/// Returns [`CodecError::SchemaMismatch`] for frames of another schema, or
/// any framing/decoding error from [`decode_frame`].
pub fn decode_event(frame: &[u8]) -> Result<(TaskEvent, String), CodecError> {
    let declared = declared_len(frame)?;
    if declared != frame.len() {
        return Err(CodecError::LengthMismatch { declared, actual: frame.len() });
    }

    let (found, offset) = decode_at::<u16>(frame, FRAME_HEADER_LEN)?;
    if found != SCHEMA_VERSION {
        return Err(CodecError::SchemaMismatch { expected: SCHEMA_VERSION, found });
    }

    let ((event, name), end) = decode_at::<(TaskEvent, String)>(frame, offset)?;
    if end != frame.len() {
        return Err(CodecError::TrailingBytes(frame.len() - end));
    }
    Ok((event, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskscope_common::INVALID_UID;

    fn sample_event() -> TaskEvent {
        let mut event = TaskEvent::new(11);
        event.group_uid = 10;
        event.started_at = 100;
        event.stopped_at = 350;
        event.started_on_thread = 4242;
        event.stopped_on_thread = 4243;
        event.started_on_core = 2;
        event.stopped_on_core = 3;
        event
    }

    #[test]
    fn test_frame_length_counts_header_and_fields() {
        let args = (7u32, 3u8, String::from("stage1"));
        let frame = encode_frame(&args).unwrap();

        assert_eq!(frame.len(), 2 + 4 + 1 + (8 + 6));
        assert_eq!(frame.len(), FRAME_HEADER_LEN + args.encoded_len());
        assert_eq!(declared_len(frame.as_bytes()).unwrap(), frame.len());
    }

    #[test]
    fn test_tuple_that_does_not_fit_writes_nothing() {
        use crate::ring_buffer::RingBuffer;

        let (producer, consumer) = RingBuffer::with_capacity(10);
        let mut out = TypedBuffer::new(producer);

        // The u32 alone would fit, the name would not
        assert!(!(7u32, "too long name").encode(&mut out));
        assert_eq!(consumer.readable_size(), 0);
        assert_eq!(out.empty_space(), 10);

        assert!((7u32, 1u16).encode(&mut out));
        assert_eq!(consumer.readable_size(), 6);
    }

    #[test]
    fn test_heterogeneous_round_trip() {
        let args = (-5i32, u64::MAX, String::from("héllo"), 1.5f64, String::new());
        let frame = encode_frame(&args).unwrap();
        let decoded: (i32, u64, String, f64, String) = decode_frame(frame.as_bytes()).unwrap();
        assert_eq!(decoded, args);
    }

    #[test]
    fn test_text_is_length_then_bytes() {
        let frame = encode_frame(&("ab",)).unwrap();
        let payload = frame.payload();
        assert_eq!(&payload[..8], &2u64.to_ne_bytes());
        assert_eq!(&payload[8..], b"ab");
    }

    #[test]
    fn test_decode_at_reports_new_offset() {
        let frame = encode_frame(&(1u16, 2u32, "xyz")).unwrap();
        let bytes = frame.as_bytes();

        let (first, offset) = decode_at::<u16>(bytes, 2).unwrap();
        assert_eq!((first, offset), (1, 4));
        let (second, offset) = decode_at::<u32>(bytes, offset).unwrap();
        assert_eq!((second, offset), (2, 8));
        let (name, offset) = decode_at::<String>(bytes, offset).unwrap();
        assert_eq!(name, "xyz");
        assert_eq!(offset, bytes.len());
    }

    #[test]
    fn test_event_round_trip() {
        let event = sample_event();
        let frame = encode_event(&event, "stage1").unwrap();
        assert_eq!(frame.len(), 2 + 2 + size_of::<TaskEvent>() + 8 + 6);

        let (decoded, name) = decode_event(frame.as_bytes()).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(name, "stage1");
    }

    #[test]
    fn test_top_level_event_keeps_sentinel() {
        let event = TaskEvent::new(1);
        let frame = encode_event(&event, "compute").unwrap();
        let (decoded, _) = decode_event(frame.as_bytes()).unwrap();
        assert_eq!(decoded.group_uid, INVALID_UID);
    }

    #[test]
    fn test_schema_mismatch_is_rejected() {
        let frame = encode_frame(&(SCHEMA_VERSION + 1, sample_event(), "x")).unwrap();
        let err = decode_event(frame.as_bytes()).unwrap_err();
        assert_eq!(err, CodecError::SchemaMismatch { expected: SCHEMA_VERSION, found: SCHEMA_VERSION + 1 });
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let mut bytes = encode_event(&sample_event(), "x").unwrap().into_bytes();
        bytes.push(0);
        assert!(matches!(decode_event(&bytes), Err(CodecError::LengthMismatch { .. })));
        assert!(matches!(Frame::from_bytes(bytes), Err(CodecError::LengthMismatch { .. })));
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let frame = encode_frame(&(1u32, 2u32)).unwrap();
        let err = decode_frame::<(u32,)>(frame.as_bytes()).unwrap_err();
        assert_eq!(err, CodecError::TrailingBytes(4));
    }

    #[test]
    fn test_oversized_name_is_rejected() {
        let name = "n".repeat(MAX_FRAME_LEN);
        let err = encode_event(&sample_event(), &name).unwrap_err();
        assert!(matches!(err, CodecError::FrameTooLarge { .. }));
    }

    #[test]
    fn test_lying_text_length_is_truncated_not_allocated() {
        let mut bytes = encode_frame(&("abc",)).unwrap().into_bytes();
        bytes[2..10].copy_from_slice(&u64::MAX.to_ne_bytes());
        let err = decode_frame::<(String,)>(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { offset: 10, .. }));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let mut bytes = encode_frame(&("ab",)).unwrap().into_bytes();
        bytes[10] = 0xFF;
        assert_eq!(decode_frame::<(String,)>(&bytes).unwrap_err(), CodecError::InvalidUtf8);
    }
}
