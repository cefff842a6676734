//! # Typed Buffer View
//!
//! Byte-level buffers only move `&[u8]`. [`TypedBuffer`] layers typed access on
//! top of any of them: single plain-old-data values, fixed-size arrays and
//! dynamic slices, plus `<<` / `>>` chaining.
//!
//! Values are copied with their exact in-memory representation. There is no
//! endianness conversion; both ends of a buffer are assumed to share one
//! machine format.
//!
//! ## Byte-level seams
//!
//! - [`ByteSink`]: something bytes can be written into (`Vec<u8>`, the ring
//!   buffer's producer half)
//! - [`ByteSource`]: something bytes can be read out of ([`ByteCursor`], the
//!   ring buffer's consumer half)
//!
//! Every transfer is all-or-nothing: an operation that does not fit returns
//! `false` and leaves the buffer untouched.

use bytemuck::Pod;
use std::ops::{Shl, Shr};

/// Byte-level write side of a buffer
pub trait ByteSink {
    /// Number of bytes that can currently be written
    fn writable_size(&self) -> usize;

    /// Write all of `src`, or nothing if it does not fit
    fn write_bytes(&mut self, src: &[u8]) -> bool;
}

/// Byte-level read side of a buffer
pub trait ByteSource {
    /// Number of bytes that can currently be read
    fn readable_size(&self) -> usize;

    /// Fill all of `dst`, or nothing if not enough bytes are available
    fn read_bytes(&mut self, dst: &mut [u8]) -> bool;
}

impl<B: ByteSink + ?Sized> ByteSink for &mut B {
    fn writable_size(&self) -> usize {
        (**self).writable_size()
    }

    fn write_bytes(&mut self, src: &[u8]) -> bool {
        (**self).write_bytes(src)
    }
}

impl<B: ByteSource + ?Sized> ByteSource for &mut B {
    fn readable_size(&self) -> usize {
        (**self).readable_size()
    }

    fn read_bytes(&mut self, dst: &mut [u8]) -> bool {
        (**self).read_bytes(dst)
    }
}

/// A growable vector accepts writes until allocation limits
impl ByteSink for Vec<u8> {
    fn writable_size(&self) -> usize {
        isize::MAX.unsigned_abs() - self.len()
    }

    fn write_bytes(&mut self, src: &[u8]) -> bool {
        if src.len() > self.writable_size() {
            return false;
        }
        self.extend_from_slice(src);
        true
    }
}

/// Read cursor over a borrowed byte slice
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    /// Start reading at `position` (clamped to the slice length)
    #[must_use]
    pub fn at(bytes: &'a [u8], position: usize) -> Self {
        Self { bytes, position: position.min(bytes.len()) }
    }

    /// Offset of the next byte to be read
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// The unread tail of the slice
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.position..]
    }
}

impl ByteSource for ByteCursor<'_> {
    fn readable_size(&self) -> usize {
        self.bytes.len() - self.position
    }

    fn read_bytes(&mut self, dst: &mut [u8]) -> bool {
        if dst.len() > self.readable_size() {
            return false;
        }
        let end = self.position + dst.len();
        dst.copy_from_slice(&self.bytes[self.position..end]);
        self.position = end;
        true
    }
}

/// Typed view over a byte-level buffer
///
/// The `bool`-returning methods report each transfer individually. The `<<`
/// and `>>` operators cannot return a status, so they latch the first failure
/// instead; once latched, further chained operations are skipped until
/// [`TypedBuffer::reset_state`] is called.
///
/// ```
/// use taskscope::buffer::{ByteCursor, TypedBuffer};
///
/// let mut out = TypedBuffer::new(Vec::new());
/// let _ = &mut out << &7u32 << &[1u8, 2, 3];
/// assert!(out.is_ok());
///
/// let bytes = out.into_inner();
/// let mut input = TypedBuffer::new(ByteCursor::new(&bytes));
/// let (mut id, mut tail) = (0u32, [0u8; 3]);
/// let _ = &mut input >> &mut id >> &mut tail;
/// assert!(input.is_ok());
/// assert_eq!((id, tail), (7, [1, 2, 3]));
/// ```
#[derive(Debug, Clone)]
pub struct TypedBuffer<B> {
    inner: B,
    failed: bool,
}

impl<B> TypedBuffer<B> {
    pub fn new(inner: B) -> Self {
        Self { inner, failed: false }
    }

    /// False once a chained `<<` / `>>` operation failed
    #[must_use]
    pub fn is_ok(&self) -> bool {
        !self.failed
    }

    /// Clear a latched chaining failure
    pub fn reset_state(&mut self) {
        self.failed = false;
    }

    pub fn get_ref(&self) -> &B {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut B {
        &mut self.inner
    }

    pub fn into_inner(self) -> B {
        self.inner
    }
}

impl<B: ByteSink> TypedBuffer<B> {
    /// Write one value
    pub fn write<T: Pod>(&mut self, value: &T) -> bool {
        self.inner.write_bytes(bytemuck::bytes_of(value))
    }

    /// Write a fixed-length array
    pub fn write_array<T: Pod, const N: usize>(&mut self, values: &[T; N]) -> bool {
        self.write_slice(values.as_slice())
    }

    /// Write `values.len()` elements
    pub fn write_slice<T: Pod>(&mut self, values: &[T]) -> bool {
        self.inner.write_bytes(bytemuck::cast_slice(values))
    }

    /// Bytes that can still be written
    #[must_use]
    pub fn empty_space(&self) -> usize {
        self.inner.writable_size()
    }
}

impl<B: ByteSource> TypedBuffer<B> {
    /// Read one value into `value`
    pub fn read<T: Pod>(&mut self, value: &mut T) -> bool {
        self.inner.read_bytes(bytemuck::bytes_of_mut(value))
    }

    /// Read one value, `None` if not enough bytes are available
    pub fn read_value<T: Pod>(&mut self) -> Option<T> {
        let mut value = T::zeroed();
        self.read(&mut value).then_some(value)
    }

    /// Fill a fixed-length array
    pub fn read_array<T: Pod, const N: usize>(&mut self, values: &mut [T; N]) -> bool {
        self.read_slice(values.as_mut_slice())
    }

    /// Fill `values.len()` elements
    pub fn read_slice<T: Pod>(&mut self, values: &mut [T]) -> bool {
        self.inner.read_bytes(bytemuck::cast_slice_mut(values))
    }

    /// Bytes available for reading
    #[must_use]
    pub fn used_space(&self) -> usize {
        self.inner.readable_size()
    }
}

impl<'a, B: ByteSink, T: Pod> Shl<&T> for &'a mut TypedBuffer<B> {
    type Output = &'a mut TypedBuffer<B>;

    fn shl(self, value: &T) -> Self::Output {
        if !self.failed && !self.write(value) {
            self.failed = true;
        }
        self
    }
}

impl<'a, B: ByteSource, T: Pod> Shr<&mut T> for &'a mut TypedBuffer<B> {
    type Output = &'a mut TypedBuffer<B>;

    fn shr(self, value: &mut T) -> Self::Output {
        if !self.failed && !self.read(value) {
            self.failed = true;
        }
        self
    }
}
