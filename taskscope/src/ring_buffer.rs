//! # SPSC Ring Buffer
//!
//! Fixed-capacity, non-overwriting byte ring shared by exactly one producer
//! thread and one consumer thread, without locks.
//!
//! [`RingBuffer::with_capacity`] returns the two halves. Neither half is
//! `Clone`, and both operations take `&mut self`, so the single-producer /
//! single-consumer contract is enforced by ownership.
//!
//! ## Cursors
//!
//! Each end is tracked by a [`Cursor`] `(index, loop_flag)`. When both indices
//! are equal the buffer is empty if the loop flags match and full if they
//! differ. A cursor is packed into one `AtomicU64` so it is published in a
//! single store.
//!
//! ## Memory Ordering
//!
//! Each cursor is stored by one thread only:
//! - the owner reads its own cursor with `Relaxed`
//! - it reads the other side's cursor with `Acquire`, so the peer's byte
//!   copies (or reads) are complete before this side touches those bytes
//! - it publishes its cursor with `Release`, after its own byte copy

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::buffer::{ByteSink, ByteSource};

/// Position of one end of the ring, plus the parity of its wrap-arounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub index: u32,
    pub loop_flag: bool,
}

impl Cursor {
    const LOOP_BIT: u64 = 1 << 32;

    fn pack(self) -> u64 {
        let flag = if self.loop_flag { Self::LOOP_BIT } else { 0 };
        u64::from(self.index) | flag
    }

    #[allow(clippy::cast_possible_truncation)]
    fn unpack(raw: u64) -> Self {
        Self { index: raw as u32, loop_flag: raw & Self::LOOP_BIT != 0 }
    }

    /// Move forward by `size` bytes, toggling the loop flag on wrap
    #[allow(clippy::cast_possible_truncation)]
    fn advance(self, size: usize, capacity: usize) -> Self {
        let end = self.index as usize + size;
        Self {
            // capacity <= u32::MAX, so the remainder fits
            index: (end % capacity) as u32,
            loop_flag: if end >= capacity { !self.loop_flag } else { self.loop_flag },
        }
    }
}

/// Bytes readable given both cursors
fn readable_between(read: Cursor, write: Cursor, capacity: usize) -> usize {
    let (r, w) = (read.index as usize, write.index as usize);
    if r == w {
        if read.loop_flag == write.loop_flag {
            0
        } else {
            capacity
        }
    } else if w > r {
        w - r
    } else {
        capacity + w - r
    }
}

struct Shared {
    storage: Box<[UnsafeCell<u8>]>,
    capacity: usize,
    read: AtomicU64,
    write: AtomicU64,
}

// SAFETY: bytes in `storage` are only touched by the producer in the writable
// region and by the consumer in the readable region. The regions never
// overlap, and ownership of a region moves between threads only through the
// Release/Acquire cursor publication described in the module docs.
#[allow(unsafe_code)]
unsafe impl Sync for Shared {}

impl Shared {
    fn base(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.storage.as_ptr())
    }

    fn load_read(&self, order: Ordering) -> Cursor {
        Cursor::unpack(self.read.load(order))
    }

    fn load_write(&self, order: Ordering) -> Cursor {
        Cursor::unpack(self.write.load(order))
    }

    /// Where a transfer of `size` bytes starting at `index` wraps, if it does
    fn split_at(&self, index: u32, size: usize) -> Option<usize> {
        let tail = self.capacity - index as usize;
        (size > tail).then_some(tail)
    }

    /// Copy `src` into storage at `at`, wrapping to the head if needed
    #[allow(unsafe_code)]
    fn copy_in(&self, at: u32, src: &[u8]) {
        let (first, second) = match self.split_at(at, src.len()) {
            Some(tail) => src.split_at(tail),
            None => (src, Default::default()),
        };
        // SAFETY: `at + first.len() <= capacity` and `second.len() < capacity`
        // by construction of the split. The caller (producer) checked that
        // the whole range lies in the writable region, which the consumer
        // does not access until the write cursor is released.
        unsafe {
            std::ptr::copy_nonoverlapping(first.as_ptr(), self.base().add(at as usize), first.len());
            std::ptr::copy_nonoverlapping(second.as_ptr(), self.base(), second.len());
        }
    }

    /// Copy from storage at `at` into `dst`, wrapping to the head if needed
    #[allow(unsafe_code)]
    fn copy_out(&self, at: u32, dst: &mut [u8]) {
        let (first, second) = match self.split_at(at, dst.len()) {
            Some(tail) => dst.split_at_mut(tail),
            None => (dst, Default::default()),
        };
        // SAFETY: mirror of `copy_in`; the range lies in the readable region,
        // which the producer does not touch until the read cursor is released.
        unsafe {
            std::ptr::copy_nonoverlapping(self.base().add(at as usize), first.as_mut_ptr(), first.len());
            std::ptr::copy_nonoverlapping(self.base(), second.as_mut_ptr(), second.len());
        }
    }
}

/// Constructor namespace for the two ring halves
pub struct RingBuffer;

impl RingBuffer {
    /// Allocate a ring of `capacity` bytes and split it into its two ends
    ///
    /// # Panics
    /// Panics if `capacity` is zero or does not fit in a `u32`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> (RingProducer, RingConsumer) {
        assert!(capacity > 0, "Ring buffer capacity must be non-zero");
        assert!(u32::try_from(capacity).is_ok(), "Ring buffer capacity must fit in a u32");

        let storage = (0..capacity).map(|_| UnsafeCell::new(0)).collect();
        let shared = Arc::new(Shared {
            storage,
            capacity,
            read: AtomicU64::new(Cursor::default().pack()),
            write: AtomicU64::new(Cursor::default().pack()),
        });

        (RingProducer { shared: Arc::clone(&shared) }, RingConsumer { shared })
    }
}

/// Write end of a ring buffer
pub struct RingProducer {
    shared: Arc<Shared>,
}

impl RingProducer {
    /// Write all of `src` or nothing
    ///
    /// Returns `false`, leaving the ring untouched, if `src` is longer than
    /// [`RingProducer::writable_size`].
    pub fn write(&mut self, src: &[u8]) -> bool {
        let shared = &*self.shared;
        let write = shared.load_write(Ordering::Relaxed);
        let read = shared.load_read(Ordering::Acquire);

        if src.len() > shared.capacity - readable_between(read, write, shared.capacity) {
            return false;
        }
        if src.is_empty() {
            return true;
        }

        shared.copy_in(write.index, src);
        shared.write.store(write.advance(src.len(), shared.capacity).pack(), Ordering::Release);
        true
    }

    /// Free space, as seen by the producer
    #[must_use]
    pub fn writable_size(&self) -> usize {
        self.shared.capacity - self.readable_size()
    }

    /// Bytes waiting for the consumer
    #[must_use]
    pub fn readable_size(&self) -> usize {
        let write = self.shared.load_write(Ordering::Relaxed);
        let read = self.shared.load_read(Ordering::Acquire);
        readable_between(read, write, self.shared.capacity)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Snapshot of the `(read, write)` cursors
    #[must_use]
    pub fn cursors(&self) -> (Cursor, Cursor) {
        (self.shared.load_read(Ordering::Acquire), self.shared.load_write(Ordering::Relaxed))
    }
}

/// Read end of a ring buffer
pub struct RingConsumer {
    shared: Arc<Shared>,
}

impl RingConsumer {
    /// Fill all of `dst` or nothing
    ///
    /// Returns `false`, leaving the ring untouched, if `dst` is longer than
    /// [`RingConsumer::readable_size`].
    pub fn read(&mut self, dst: &mut [u8]) -> bool {
        let shared = &*self.shared;
        let read = shared.load_read(Ordering::Relaxed);
        let write = shared.load_write(Ordering::Acquire);

        if dst.len() > readable_between(read, write, shared.capacity) {
            return false;
        }
        if dst.is_empty() {
            return true;
        }

        shared.copy_out(read.index, dst);
        shared.read.store(read.advance(dst.len(), shared.capacity).pack(), Ordering::Release);
        true
    }

    /// Bytes available, as seen by the consumer
    #[must_use]
    pub fn readable_size(&self) -> usize {
        let read = self.shared.load_read(Ordering::Relaxed);
        let write = self.shared.load_write(Ordering::Acquire);
        readable_between(read, write, self.shared.capacity)
    }

    #[must_use]
    pub fn writable_size(&self) -> usize {
        self.shared.capacity - self.readable_size()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Snapshot of the `(read, write)` cursors
    #[must_use]
    pub fn cursors(&self) -> (Cursor, Cursor) {
        (self.shared.load_read(Ordering::Relaxed), self.shared.load_write(Ordering::Acquire))
    }
}

impl ByteSink for RingProducer {
    fn writable_size(&self) -> usize {
        RingProducer::writable_size(self)
    }

    fn write_bytes(&mut self, src: &[u8]) -> bool {
        self.write(src)
    }
}

impl ByteSource for RingConsumer {
    fn readable_size(&self) -> usize {
        RingConsumer::readable_size(self)
    }

    fn read_bytes(&mut self, dst: &mut [u8]) -> bool {
        self.read(dst)
    }
}

impl fmt::Debug for RingProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (read, write) = self.cursors();
        f.debug_struct("RingProducer")
            .field("capacity", &self.shared.capacity)
            .field("read", &read)
            .field("write", &write)
            .finish()
    }
}

impl fmt::Debug for RingConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (read, write) = self.cursors();
        f.debug_struct("RingConsumer")
            .field("capacity", &self.shared.capacity)
            .field("read", &read)
            .field("write", &write)
            .finish()
    }
}
