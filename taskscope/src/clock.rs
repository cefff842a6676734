//! Tick clock and execution-placement probes
//!
//! Timestamps travel as opaque 32-bit tick counts relative to the producer's
//! clock epoch. The collector only needs the producer's [`TickFrequency`] to
//! turn tick deltas into milliseconds.

use std::time::Instant;

use taskscope_common::UNKNOWN_CORE;

use crate::domain::TickFrequency;

/// Monotonic tick source
pub trait Clock: Send + Sync {
    /// Current tick count
    fn now(&self) -> u32;

    /// Ticks per second
    fn frequency(&self) -> TickFrequency;

    /// Milliseconds between two tick counts
    fn ticks_to_ms(&self, start: u32, stop: u32) -> f64 {
        self.frequency().to_millis(start, stop)
    }
}

/// Microsecond clock backed by [`Instant`]
///
/// Ticks count from construction and wrap after about 71 minutes; deltas
/// are computed with wrapping arithmetic so a single wrap is harmless.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[allow(clippy::cast_possible_truncation)]
    fn now(&self) -> u32 {
        // Truncation to 32 bits is the documented wrap
        self.epoch.elapsed().as_micros() as u32
    }

    fn frequency(&self) -> TickFrequency {
        TickFrequency::MICROS
    }
}

/// Logical core the calling thread is running on, `0xFF` if unknown
#[cfg(target_os = "linux")]
#[must_use]
#[allow(unsafe_code)]
pub fn current_core() -> u8 {
    // SAFETY: sched_getcpu has no preconditions
    let cpu = unsafe { libc::sched_getcpu() };
    core_from_raw(cpu)
}

/// Narrow an OS core index to the wire's `u8`
///
/// Errors (negative values) and cores from 255 upward become `0xFF`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn core_from_raw(cpu: i32) -> u8 {
    u8::try_from(cpu).unwrap_or(UNKNOWN_CORE)
}

#[cfg(not(target_os = "linux"))]
#[must_use]
pub fn current_core() -> u8 {
    UNKNOWN_CORE
}

/// OS-level identifier of the calling thread
#[cfg(target_os = "linux")]
#[must_use]
#[allow(unsafe_code)]
pub fn current_thread_id() -> u64 {
    // SAFETY: gettid has no preconditions and cannot fail
    let tid = unsafe { libc::gettid() };
    u64::try_from(tid).unwrap_or_default()
}

#[cfg(not(target_os = "linux"))]
#[must_use]
pub fn current_thread_id() -> u64 {
    use std::hash::{Hash, Hasher};

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    hasher.finish()
}
